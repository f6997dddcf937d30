//! Text encoding of a [`HistorySnapshot`].

use std::fmt::Write as _;

use autostart_app::ports::history::HistorySnapshot;

const HEADER: &str = "# autostart startup times\n# Format: server:time1,time2,...\n# Times are in milliseconds\n\n";

/// Decode the file content. Never fails: unusable lines are skipped.
#[must_use]
pub fn parse(content: &str) -> HistorySnapshot {
    let mut snapshot = HistorySnapshot::new();
    for line in content.lines().map(str::trim) {
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((server, times)) = line.split_once(':') else {
            tracing::debug!(line, "skipping history line without separator");
            continue;
        };
        let server = server.trim();
        if server.is_empty() {
            continue;
        }
        let millis: Vec<u64> = times
            .split(',')
            .filter_map(|t| t.trim().parse::<u64>().ok())
            .filter(|&ms| ms > 0)
            .collect();
        if !millis.is_empty() {
            snapshot.insert(server.to_string(), millis);
        }
    }
    snapshot
}

/// Encode a snapshot, servers sorted by name. Empty histories are omitted.
#[must_use]
pub fn render(snapshot: &HistorySnapshot) -> String {
    let mut servers: Vec<(&String, &Vec<u64>)> = snapshot
        .iter()
        .filter(|(_, millis)| !millis.is_empty())
        .collect();
    servers.sort_by(|a, b| a.0.cmp(b.0));

    let mut out = String::from(HEADER);
    for (server, millis) in servers {
        let times: Vec<String> = millis.iter().map(u64::to_string).collect();
        // writing to a String cannot fail
        let _ = writeln!(out, "{server}:{}", times.join(","));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_skip_comments_blank_lines_and_bad_numbers() {
        let content = "# header\n\n survival : 41250, nope ,0, 39870 \nlobby:\nbroken line\n:123\n";
        let snapshot = parse(content);
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot["survival"], vec![41250, 39870]);
    }

    #[test]
    fn should_render_sorted_lines_after_header() {
        let mut snapshot = HistorySnapshot::new();
        snapshot.insert("survival".to_string(), vec![3000, 4000]);
        snapshot.insert("lobby".to_string(), vec![1000]);
        snapshot.insert("creative".to_string(), Vec::new());

        let text = render(&snapshot);
        assert!(text.starts_with("# autostart startup times"));
        let body: Vec<&str> = text.lines().filter(|l| !l.is_empty() && !l.starts_with('#')).collect();
        assert_eq!(body, vec!["lobby:1000", "survival:3000,4000"]);
    }

    #[test]
    fn should_read_back_what_it_wrote() {
        let mut snapshot = HistorySnapshot::new();
        snapshot.insert("survival".to_string(), vec![41250, 39870, 44010]);
        assert_eq!(parse(&render(&snapshot)), snapshot);
    }
}
