use crate::commands::common::{describe_outcome, open_session, CliPaths};
use crate::error::CliError;

pub async fn run_sync(paths: &CliPaths) -> Result<(), CliError> {
    let session = open_session(paths).await?;
    if !session.config.can_sync() {
        return Err(CliError::SyncNotConfigured);
    }

    let outcome = session.orchestrator.sync_now().await;
    session.orchestrator.shutdown();

    println!("{}", describe_outcome(&outcome?));
    Ok(())
}
