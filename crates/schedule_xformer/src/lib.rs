pub mod config;
pub mod error;
pub mod export;
pub mod fetch;
pub mod guidebook;
pub mod logging;
pub mod snapshot;
pub mod transform;

use std::io;

use tracing::info;

use config::{AppConfig, CliArgs, debug_enabled};
use error::XformerError;
use export::{dump_json, write_exports};
use fetch::GuideFetcher;
use logging::init_logging;
use snapshot::assemble_snapshot;
use transform::{TransformSettings, transform_sessions};

pub fn run(cli: CliArgs) -> Result<(), XformerError> {
    init_logging(debug_enabled())?;

    let AppConfig {
        paths,
        tunables,
        export_csv,
        dump,
    } = cli.resolve()?;

    let mut fetcher = GuideFetcher::from_tunables(&tunables)?;

    info!(guide = %tunables.guide_id, "Started fetching from Guidebook");
    let snapshot = assemble_snapshot(&mut fetcher, tunables.guests_of_honor_list_id)?;
    info!(
        requests = fetcher.successful_requests(),
        "Guidebook fetch complete"
    );

    if dump {
        return dump_json(io::stdout().lock(), &snapshot);
    }

    let settings = TransformSettings::from(&tunables);
    let sessions = transform_sessions(&snapshot, &settings)?;
    write_exports(&paths, &sessions, export_csv)?;

    info!(sessions = sessions.len(), "Schedule transform complete");
    Ok(())
}
