use serde_json::json;
use signoff_core::config::{AppConfig, LoadOptions};
use signoff_core::destinations::DestinationStore;

use super::CommandResult;

pub fn list(json_output: bool) -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(format!("config validation failed: {error}"));
        }
    };

    let store = match DestinationStore::open(&config.audit.destinations_path) {
        Ok(store) => store,
        Err(error) => return CommandResult::failure(error.to_string()),
    };

    CommandResult::success(render(&store, json_output))
}

fn render(store: &DestinationStore, json_output: bool) -> String {
    let snapshot = store.snapshot();

    if json_output {
        let payload = json!({
            "path": store.path().display().to_string(),
            "destinations": snapshot
                .iter()
                .map(|(team, channel)| json!({ "team_id": team, "channel_id": channel }))
                .collect::<Vec<_>>(),
        });
        return serde_json::to_string_pretty(&payload)
            .unwrap_or_else(|error| format!("{{\"error\":\"{error}\"}}"));
    }

    if snapshot.is_empty() {
        return format!(
            "no logging destinations configured ({})",
            store.path().display()
        );
    }

    let mut lines = vec![format!(
        "{} logging destination(s) ({}):",
        snapshot.len(),
        store.path().display()
    )];
    for (team, channel) in snapshot {
        lines.push(format!("- {team} -> {channel}"));
    }
    lines.join("\n")
}
