use flarelog::config::DateFormat;
use flarelog::Settings;
use tempfile::TempDir;

/// Settings suitable for MemoryVault tests: auto-save on, minute-precision
/// file names so collision tests are meaningful.
#[allow(dead_code)]
pub fn memory_settings() -> Settings {
    let mut settings = Settings::default();
    settings.history.date_format = DateFormat::YearMonthDayHourMinute;
    settings
}

/// Settings pointed at a temporary history folder for DiskVault tests.
/// The TempDir must outlive the store.
#[allow(dead_code)]
pub fn disk_settings() -> (TempDir, Settings) {
    let temp_dir = TempDir::new().expect("failed to create tempdir");
    let mut settings = memory_settings();
    settings.history.folder = temp_dir.path().join("history").to_string_lossy().to_string();
    (temp_dir, settings)
}
