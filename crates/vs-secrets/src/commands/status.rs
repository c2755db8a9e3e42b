//! Status command

use anyhow::Result;
use vs_secrets_sync::compute_status;

use super::{discover, load_context};
use crate::cli::PathArgs;
use crate::output::{self, StatusRow};

pub async fn run(args: PathArgs, batch: bool) -> Result<()> {
    let ctx = load_context(batch)?;
    let solutions = discover(&ctx, args.path)?;
    if solutions.is_empty() {
        return Ok(());
    }

    let spinner = output::spinner(&format!(
        "Comparing with {}...",
        ctx.repository.repository_type()
    ));

    let mut rows = Vec::with_capacity(solutions.len());
    let mut problems = 0;
    for discovered in &solutions {
        spinner.set_message(format!("Checking {}...", discovered.solution.name));
        let status = compute_status(&ctx, &discovered.solution, &discovered.containers).await;
        if status.is_error() {
            problems += 1;
        }
        rows.push(StatusRow::new(
            &discovered.solution.name,
            discovered.containers.len(),
            status,
        ));
    }
    spinner.finish_and_clear();

    output::status_table(rows);

    if problems > 0 {
        output::warning(&format!("{} solution(s) need attention", problems));
    }
    Ok(())
}
