use archive_sync_core::db::LibSqlExceptionLog;

use crate::commands::common::{
    failure_to_list_item, format_failure_lines, open_database, CommandContext, FailureListItem,
};
use crate::error::CliError;

pub async fn run_failures(
    limit: usize,
    as_json: bool,
    context: &CommandContext,
) -> Result<(), CliError> {
    let db = open_database(&context.db_path).await?;
    let entries = LibSqlExceptionLog::new(db.connection())
        .list_recent(limit)
        .await?;

    if as_json {
        let json_items = entries
            .iter()
            .map(failure_to_list_item)
            .collect::<Vec<FailureListItem>>();
        println!("{}", serde_json::to_string_pretty(&json_items)?);
        return Ok(());
    }

    if entries.is_empty() {
        println!("No failures recorded.");
        return Ok(());
    }

    for line in format_failure_lines(&entries) {
        println!("{line}");
    }
    Ok(())
}
