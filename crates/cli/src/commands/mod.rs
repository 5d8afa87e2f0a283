pub mod config;
pub mod destinations;
pub mod doctor;

/// Exit code contract: 0 success, 1 failed check or validation, 2 bad
/// invocation (clap reports usage errors itself with the same code).
#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

impl CommandResult {
    pub fn success(output: impl Into<String>) -> Self {
        Self { exit_code: 0, output: output.into() }
    }

    pub fn failure(output: impl Into<String>) -> Self {
        Self { exit_code: 1, output: output.into() }
    }
}
