pub mod init;
pub mod migrate;
pub mod rollback;
pub mod status;

use tidemark_migrate::MigrateError;

/// Turn an engine error into a CLI error, flagging the ones an operator has
/// to resolve by hand
pub(crate) fn report(error: MigrateError) -> anyhow::Error {
    if error.requires_operator() {
        eprintln!("⚠️ The database and the recorded state may disagree.");
        eprintln!("   Inspect the migration directory and the state file before running again.");
    }
    anyhow::Error::new(error)
}
