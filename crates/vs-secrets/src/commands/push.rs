//! Push command

use anyhow::{bail, Result};
use vs_secrets_sync::sync::push_all;
use vs_secrets_sync::PushOutcome;

use super::{discover, load_context};
use crate::cli::PathArgs;
use crate::output::{self, Mark};

pub async fn run(args: PathArgs, batch: bool) -> Result<()> {
    let ctx = load_context(batch)?;
    let solutions = discover(&ctx, args.path)?;

    let mut failed = 0;
    for (name, outcome) in push_all(&ctx, &solutions).await {
        match outcome {
            PushOutcome::Done => output::solution_line(Mark::Done, &name, "pushed"),
            PushOutcome::SkippedEmpty => {
                output::solution_line(Mark::Info, &name, "no secrets to push")
            }
            PushOutcome::Failed(reason) => {
                failed += 1;
                output::solution_line(Mark::Failed, &name, reason);
            }
        }
    }

    if failed > 0 {
        bail!("{} solution(s) failed to push", failed);
    }
    Ok(())
}
