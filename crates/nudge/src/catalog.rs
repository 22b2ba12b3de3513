// SPDX-FileCopyrightText: 2026 Nudge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `nudge catalog` command implementation.

use std::io::IsTerminal;

use nudge_client::BackendClient;
use nudge_config::NudgeConfig;
use nudge_core::{NudgeError, OrganizationId, TriggerDefinition, TriggerStore};
use nudge_engine::TriggerCatalog;

/// Fetch and print the organization's enabled catalog. Unlike the engine,
/// a fetch failure here is reported as an error.
pub async fn run_catalog(
    config: &NudgeConfig,
    organization_id: &str,
    json: bool,
    plain: bool,
) -> Result<(), NudgeError> {
    let client = BackendClient::new(&config.backend)?;
    let definitions = client
        .list_enabled(&OrganizationId::from(organization_id))
        .await?;
    let catalog = TriggerCatalog::from_definitions(definitions);

    if json {
        let out = serde_json::to_string_pretty(catalog.definitions()).map_err(|e| {
            NudgeError::Internal(format!("failed to serialize catalog: {e}"))
        })?;
        println!("{out}");
        return Ok(());
    }

    let use_color = !plain && std::io::stdout().is_terminal();
    println!();
    println!("  nudge catalog ({organization_id})");
    println!("  {}", "-".repeat(60));
    for definition in catalog.definitions() {
        println!("{}", format_row(definition, use_color));
    }
    println!();
    let count = catalog.len();
    let word = if count == 1 { "trigger" } else { "triggers" };
    println!("  {count} enabled {word}.");
    println!();
    Ok(())
}

fn format_row(definition: &TriggerDefinition, use_color: bool) -> String {
    let kind = definition
        .kind()
        .map(|k| k.to_string())
        .unwrap_or_else(|| "invalid".to_string());
    let line = format!(
        "    {:>4}  {:<18} {:<24} delay {:>5.1}s",
        definition.priority,
        kind,
        definition.label(),
        definition.delay.as_secs_f64()
    );
    if definition.kind().is_some() {
        return line;
    }
    if use_color {
        use colored::Colorize;
        line.yellow().to_string()
    } else {
        format!("{line}  [never matches]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nudge_core::{TriggerConditions, TriggerId};
    use std::time::Duration;

    fn definition(conditions: TriggerConditions) -> TriggerDefinition {
        TriggerDefinition {
            id: TriggerId::from("t-1"),
            name: Some("Exit offer".into()),
            conditions,
            delay: Duration::from_millis(2500),
            priority: 7,
            message: String::new(),
            enabled: true,
        }
    }

    #[test]
    fn row_shows_priority_kind_and_delay() {
        let row = format_row(
            &definition(TriggerConditions::ExitIntent { min_time_on_site: 0.0 }),
            false,
        );
        assert!(row.contains("exit_intent"));
        assert!(row.contains("Exit offer"));
        assert!(row.contains("2.5s"));
        assert!(row.trim_start().starts_with('7'));
    }

    #[test]
    fn invalid_row_is_flagged_in_plain_mode() {
        let row = format_row(
            &definition(TriggerConditions::Invalid {
                kind: "hover".into(),
                reason: "unknown trigger type `hover`".into(),
                raw: serde_json::Value::Null,
            }),
            false,
        );
        assert!(row.contains("invalid"));
        assert!(row.ends_with("[never matches]"));
    }
}
