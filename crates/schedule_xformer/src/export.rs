use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{error, info, warn};

use crate::config::Paths;
use crate::error::XformerError;
use crate::transform::WatsonSession;

/// Write `value` as pretty JSON followed by a newline.
pub fn dump_json<W, T>(mut out: W, value: &T) -> Result<(), XformerError>
where
    W: Write,
    T: Serialize + ?Sized,
{
    serde_json::to_writer_pretty(&mut out, value)?;
    writeln!(out)?;
    Ok(())
}

pub fn write_schedule(path: &Path, sessions: &[WatsonSession]) -> Result<(), XformerError> {
    let serialized = serde_json::to_string_pretty(sessions)?;
    let temp_path = build_temp_path(path);
    fs::write(&temp_path, format!("{serialized}\n"))?;
    fs::rename(&temp_path, path)?;
    info!(path = %path.display(), sessions = sessions.len(), "Schedule written");
    Ok(())
}

/// Write every export the run asked for. Only the schedule itself is fatal.
pub fn write_exports(
    paths: &Paths,
    sessions: &[WatsonSession],
    export_csv: bool,
) -> Result<(), XformerError> {
    write_schedule(&paths.schedule, sessions)?;
    write_csv_file(&paths.stream, sessions, streaming_csv::<fs::File>);

    if export_csv {
        write_csv_file(&paths.chat_links, sessions, chat_links_csv::<fs::File>);
        write_csv_file(&paths.stream_links, sessions, stream_links_csv::<fs::File>);
        write_csv_file(&paths.replay_links, sessions, replay_links_csv::<fs::File>);

        let missing = sessions_without_replay(sessions);
        if !missing.is_empty() {
            warn!(count = missing.len(), "Virtual sessions without a replay link");
            for title in missing {
                warn!(title = %title, "No replay link");
            }
        }
    }
    Ok(())
}

fn write_csv_file<F>(path: &Path, sessions: &[WatsonSession], render: F)
where
    F: Fn(&mut fs::File, &[WatsonSession]) -> io::Result<()>,
{
    let result = fs::File::create(path).and_then(|mut file| render(&mut file, sessions));
    match result {
        Ok(()) => info!(path = %path.display(), "CSV written"),
        Err(err) => error!(path = %path.display(), error = %err, "Failed to write CSV"),
    }
}

/// Virtual sessions, for the streaming front page.
pub fn streaming_csv<W: Write>(out: &mut W, sessions: &[WatsonSession]) -> io::Result<()> {
    write_row(out, &["id", "title", "datetime", "mins", "loc", "session"])?;
    for session in sessions {
        let Some(link) = session.links.session.as_deref() else {
            continue;
        };
        let id = session.id.to_string();
        let mins = session.duration_minutes.to_string();
        let locations = session.locations.join("; ");
        write_row(
            out,
            &[
                id.as_str(),
                session.name.as_str(),
                session.start_time.as_str(),
                mins.as_str(),
                locations.as_str(),
                link,
            ],
        )?;
    }
    Ok(())
}

pub fn chat_links_csv<W: Write>(out: &mut W, sessions: &[WatsonSession]) -> io::Result<()> {
    link_table(out, sessions, "chat", |session| session.links.chat.as_deref())
}

pub fn stream_links_csv<W: Write>(out: &mut W, sessions: &[WatsonSession]) -> io::Result<()> {
    link_table(out, sessions, "session", |session| session.links.session.as_deref())
}

pub fn replay_links_csv<W: Write>(out: &mut W, sessions: &[WatsonSession]) -> io::Result<()> {
    link_table(out, sessions, "replay", |session| session.links.replay.as_deref())
}

fn link_table<W, F>(
    out: &mut W,
    sessions: &[WatsonSession],
    column: &str,
    link: F,
) -> io::Result<()>
where
    W: Write,
    F: Fn(&WatsonSession) -> Option<&str>,
{
    write_row(out, &["id", "title", column])?;
    for session in sessions {
        if let Some(url) = link(session) {
            let id = session.id.to_string();
            write_row(out, &[id.as_str(), session.name.as_str(), url])?;
        }
    }
    Ok(())
}

fn sessions_without_replay(sessions: &[WatsonSession]) -> Vec<&str> {
    sessions
        .iter()
        .filter(|session| session.links.session.is_some() && session.links.replay.is_none())
        .map(|session| session.name.as_str())
        .collect()
}

fn write_row<W: Write>(out: &mut W, fields: &[&str]) -> io::Result<()> {
    let row: Vec<String> = fields.iter().map(|field| escape_field(field)).collect();
    writeln!(out, "{}", row.join(","))
}

fn escape_field(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

fn build_temp_path(path: &Path) -> PathBuf {
    let mut temp_path = path.to_path_buf();
    match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) if !ext.is_empty() => {
            temp_path.set_extension(format!("{ext}.tmp"));
        }
        _ => {
            temp_path.set_extension("tmp");
        }
    }
    temp_path
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::{Links, Tag};
    use tempfile::tempdir;

    fn watson(id: i64, name: &str, session_link: bool) -> WatsonSession {
        let url = format!("https://links.test/?item_id={id}");
        WatsonSession {
            id,
            locations: vec!["Main Stage".to_string(), "Discord".to_string()],
            name: name.to_string(),
            description: String::new(),
            start_time: "2025-08-31T10:00:00.000Z".to_string(),
            duration_minutes: 45,
            tags: vec![Tag {
                label: "Gaming".to_string(),
                value: "track_gaming".to_string(),
                category: "Track".to_string(),
            }],
            links: Links {
                session: session_link.then(|| url.clone()),
                chat: Some(url),
                ..Links::default()
            },
            people: Vec::new(),
        }
    }

    fn render<F>(render: F, sessions: &[WatsonSession]) -> String
    where
        F: Fn(&mut Vec<u8>, &[WatsonSession]) -> io::Result<()>,
    {
        let mut out = Vec::new();
        render(&mut out, sessions).expect("render csv");
        String::from_utf8(out).expect("utf8 csv")
    }

    #[test]
    fn streaming_csv_only_lists_virtual_sessions() {
        let sessions = vec![watson(1, "Live Panel", true), watson(2, "Dealers Room", false)];
        let csv = render(streaming_csv::<Vec<u8>>, &sessions);
        assert_eq!(
            csv,
            "id,title,datetime,mins,loc,session\n\
             1,Live Panel,2025-08-31T10:00:00.000Z,45,Main Stage; Discord,https://links.test/?item_id=1\n"
        );
    }

    #[test]
    fn chat_csv_lists_every_session_and_quotes_titles() {
        let sessions = vec![watson(1, "Art, Craft & \"Stuff\"", false), watson(2, "Plain", true)];
        let csv = render(chat_links_csv::<Vec<u8>>, &sessions);
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "id,title,chat");
        assert_eq!(
            lines[1],
            "1,\"Art, Craft & \"\"Stuff\"\"\",https://links.test/?item_id=1"
        );
        assert_eq!(lines[2], "2,Plain,https://links.test/?item_id=2");
    }

    #[test]
    fn replay_csv_has_header_only_without_replays() {
        let sessions = vec![watson(1, "Live Panel", true)];
        assert_eq!(render(replay_links_csv::<Vec<u8>>, &sessions), "id,title,replay\n");
        assert_eq!(sessions_without_replay(&sessions), vec!["Live Panel"]);
    }

    #[test]
    fn writes_schedule_and_optional_csvs() {
        let temp = tempdir().expect("tempdir");
        let paths = Paths {
            schedule: temp.path().join("schedule.json"),
            stream: temp.path().join("streaming.csv"),
            stream_links: temp.path().join("stream_links.csv"),
            chat_links: temp.path().join("chat_links.csv"),
            replay_links: temp.path().join("replay_links.csv"),
        };
        let sessions = vec![watson(1, "Live Panel", true)];

        write_exports(&paths, &sessions, false).expect("exports");
        let written = fs::read_to_string(&paths.schedule).expect("schedule");
        let parsed: Vec<WatsonSession> = serde_json::from_str(&written).expect("valid json");
        assert_eq!(parsed, sessions);
        assert!(paths.stream.exists());
        assert!(!paths.chat_links.exists());
        assert!(!build_temp_path(&paths.schedule).exists());

        write_exports(&paths, &sessions, true).expect("exports with csv");
        assert!(paths.chat_links.exists());
        assert!(paths.stream_links.exists());
        assert!(paths.replay_links.exists());
    }

    #[test]
    fn dump_json_is_pretty_with_trailing_newline() {
        let mut out = Vec::new();
        dump_json(&mut out, &vec![1, 2]).expect("dump");
        assert_eq!(String::from_utf8(out).unwrap(), "[\n  1,\n  2\n]\n");
    }
}
