use std::env;
use std::path::PathBuf;

use clap::Parser;

use crate::error::XformerError;

pub const DEFAULT_API_BASE: &str = "https://builder.guidebook.com/open-api/v1.1";
pub const DEFAULT_DEEP_LINK_BASE: &str = "https://guidebook.com/app/deeplink/?";

/// Custom list whose members are flagged as guests of honor.
pub const DEFAULT_GUESTS_OF_HONOR_LIST_ID: i64 = 1_153_959;

/// Locations that stand for the virtual convention rather than a physical room.
pub const DEFAULT_VIRTUAL_ROOM_IDS: [i64; 2] = [4_925_771, 4_925_772];

/// CLI surface for the schedule transformer.
#[derive(Debug, Parser, Clone, Default)]
#[command(
    author,
    version,
    about = "Transform a Guidebook guide into the Watson schedule format"
)]
pub struct CliArgs {
    /// Export CSV files for stream, chat and replay links for loading into Guidebook.
    #[arg(long)]
    pub csv: bool,

    /// Dump the full contents loaded from Guidebook as JSON instead of transforming.
    #[arg(long)]
    pub dump: bool,
}

#[derive(Debug, Clone)]
pub struct Paths {
    pub schedule: PathBuf,
    pub stream: PathBuf,
    pub stream_links: PathBuf,
    pub chat_links: PathBuf,
    pub replay_links: PathBuf,
}

#[derive(Debug, Clone)]
pub struct Tunables {
    pub api_base: String,
    pub api_key: String,
    pub guide_id: String,
    pub guests_of_honor_list_id: i64,
    pub virtual_room_ids: Vec<i64>,
    pub deep_link_base: String,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub paths: Paths,
    pub tunables: Tunables,
    pub export_csv: bool,
    pub dump: bool,
}

impl CliArgs {
    pub fn resolve(self) -> Result<AppConfig, XformerError> {
        let paths = Paths::from_env()?;
        let tunables = Tunables::from_env()?;

        Ok(AppConfig {
            paths,
            tunables,
            export_csv: self.csv,
            dump: self.dump,
        })
    }
}

impl Paths {
    pub fn from_env() -> Result<Self, XformerError> {
        let paths = Self {
            schedule: path_env("SCHEDULE_PATH", "/var/www/html/schedule.json"),
            stream: path_env("STREAM_PATH", "/var/www/html/streaming.csv"),
            stream_links: path_env("STREAM_LINKS_PATH", "/var/www/html/stream_links.csv"),
            chat_links: path_env("CHAT_LINKS_PATH", "/var/www/html/chat_links.csv"),
            replay_links: path_env("REPLAY_LINKS_PATH", "/var/www/html/replay_links.csv"),
        };
        paths.validate()?;
        Ok(paths)
    }

    pub fn validate(&self) -> Result<(), XformerError> {
        if self.schedule == self.stream {
            return Err(XformerError::config(
                "SCHEDULE_PATH and STREAM_PATH must be set to different values",
            ));
        }
        Ok(())
    }
}

impl Tunables {
    pub fn from_env() -> Result<Self, XformerError> {
        let api_key = required_env("GB_API_KEY")?;
        let guide_id = required_env("GB_ID")?;
        let api_base = env::var("GB_API_BASE").unwrap_or_else(|_| DEFAULT_API_BASE.to_string());
        let deep_link_base =
            env::var("DEEP_LINK_BASE").unwrap_or_else(|_| DEFAULT_DEEP_LINK_BASE.to_string());

        let guests_of_honor_list_id = parse_env(
            "GUESTS_OF_HONOR_LIST_ID",
            DEFAULT_GUESTS_OF_HONOR_LIST_ID,
            |s| s.trim().parse::<i64>(),
        )?;
        let virtual_room_ids = match env::var("VIRTUAL_ROOM_IDS") {
            Ok(raw) => parse_id_list("VIRTUAL_ROOM_IDS", &raw)?,
            Err(_) => DEFAULT_VIRTUAL_ROOM_IDS.to_vec(),
        };

        Ok(Self {
            api_base,
            api_key,
            guide_id,
            guests_of_honor_list_id,
            virtual_room_ids,
            deep_link_base,
        })
    }
}

/// `XFORMER_DEBUG=true` switches on verbose logging.
pub fn debug_enabled() -> bool {
    env::var("XFORMER_DEBUG")
        .map(|value| value.trim().eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

fn required_env(var: &str) -> Result<String, XformerError> {
    match env::var(var) {
        Ok(value) if !value.trim().is_empty() => Ok(value.trim().to_string()),
        _ => Err(XformerError::Config(format!("{var} is not set"))),
    }
}

fn path_env(var: &str, default: &str) -> PathBuf {
    let value = env::var(var).unwrap_or_else(|_| default.to_string());
    tracing::debug!(var, value = %value, "resolved output path");
    PathBuf::from(value)
}

pub(crate) fn parse_id_list(var: &str, raw: &str) -> Result<Vec<i64>, XformerError> {
    raw.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            part.parse::<i64>().map_err(|err| {
                XformerError::Config(format!("invalid value for {var}: {part:?}: {err}"))
            })
        })
        .collect()
}

fn parse_env<T, F, E>(var: &str, default: T, mut parser: F) -> Result<T, XformerError>
where
    F: FnMut(&str) -> Result<T, E>,
    T: Copy,
    E: std::fmt::Display,
{
    match env::var(var) {
        Ok(value) => match parser(&value) {
            Ok(parsed) => Ok(parsed),
            Err(err) => Err(XformerError::Config(format!(
                "invalid value for {}: {}",
                var, err
            ))),
        },
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_paths() -> Paths {
        Paths {
            schedule: PathBuf::from("out/schedule.json"),
            stream: PathBuf::from("out/streaming.csv"),
            stream_links: PathBuf::from("out/stream_links.csv"),
            chat_links: PathBuf::from("out/chat_links.csv"),
            replay_links: PathBuf::from("out/replay_links.csv"),
        }
    }

    #[test]
    fn parses_comma_separated_room_ids() {
        let ids = parse_id_list("VIRTUAL_ROOM_IDS", " 12, 34 ,,56 ").expect("valid list");
        assert_eq!(ids, vec![12, 34, 56]);
    }

    #[test]
    fn rejects_non_numeric_room_ids() {
        let err = parse_id_list("VIRTUAL_ROOM_IDS", "12,main-stage").unwrap_err();
        assert!(matches!(err, XformerError::Config(_)));
        assert!(err.to_string().contains("main-stage"));
    }

    #[test]
    fn schedule_and_stream_paths_must_differ() {
        let mut paths = sample_paths();
        assert!(paths.validate().is_ok());

        paths.stream = paths.schedule.clone();
        assert!(matches!(paths.validate(), Err(XformerError::Config(_))));
    }

    #[test]
    fn transform_settings_carry_the_tunables() {
        let tunables = Tunables {
            api_base: DEFAULT_API_BASE.to_string(),
            api_key: "key".to_string(),
            guide_id: "4242".to_string(),
            guests_of_honor_list_id: DEFAULT_GUESTS_OF_HONOR_LIST_ID,
            virtual_room_ids: vec![501],
            deep_link_base: "https://links.test/?".to_string(),
        };

        let settings = crate::transform::TransformSettings::from(&tunables);
        assert_eq!(settings.virtual_room_ids, vec![501]);
        assert_eq!(settings.deep_link_base, "https://links.test/?");
    }

    #[test]
    fn cli_flags_default_to_off() {
        let cli = CliArgs::parse_from(["schedule-xformer"]);
        assert!(!cli.csv);
        assert!(!cli.dump);

        let cli = CliArgs::parse_from(["schedule-xformer", "--csv", "--dump"]);
        assert!(cli.csv);
        assert!(cli.dump);
    }
}
