//! Pull command

use anyhow::{bail, Result};
use vs_secrets_sync::sync::pull_all;
use vs_secrets_sync::PullOutcome;

use super::{discover, load_context};
use crate::cli::PathArgs;
use crate::output::{self, Mark};

pub async fn run(args: PathArgs, batch: bool) -> Result<()> {
    let ctx = load_context(batch)?;
    let mut solutions = discover(&ctx, args.path)?;

    let mut failed = 0;
    for (name, outcome) in pull_all(&ctx, &mut solutions).await {
        match outcome {
            PullOutcome::Done => output::solution_line(Mark::Done, &name, "pulled"),
            PullOutcome::NotFound => output::solution_line(Mark::Warn, &name, "no remote secrets"),
            PullOutcome::Failed(reason) => {
                failed += 1;
                output::solution_line(Mark::Failed, &name, reason);
            }
        }
    }

    if failed > 0 {
        bail!("{} solution(s) failed to pull", failed);
    }
    Ok(())
}
