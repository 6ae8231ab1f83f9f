//! check command - Validate metadata and user records

use anyhow::{bail, Result};

use super::{block_on, open_pool};
use crate::cli::Context;
use crate::store::{BranchReport, BranchStatus, CheckReport};

/// Check the selected ref, every branch (`all`) or the test ref (`test`).
///
/// Fails when any error is found; warnings are only printed.
pub fn check(ctx: &Context, all: bool, test: bool) -> Result<()> {
    let pool = open_pool(ctx)?;
    let checker = pool.checker()?;

    let report = block_on(async {
        if all {
            checker.check_all_heads().await
        } else if test {
            Ok(CheckReport {
                branches: vec![checker.check_test_ref().await?],
            })
        } else {
            let refname = match &ctx.refname {
                Some(name) => crate::core::types::RefName::parse(name)?,
                None => pool.default_ref()?,
            };
            Ok(CheckReport {
                branches: vec![checker.check_ref(&refname).await?],
            })
        }
    })??;

    for branch in &report.branches {
        print_branch(ctx, branch);
    }

    if !report.is_clean() {
        bail!(
            "check failed: {} error(s), {} warning(s)",
            report.error_count(),
            report.warning_count()
        );
    }
    if !ctx.quiet {
        println!(
            "All {} ref(s) ok ({} warning(s))",
            report.branches.len(),
            report.warning_count()
        );
    }
    Ok(())
}

fn print_branch(ctx: &Context, branch: &BranchReport) {
    match &branch.status {
        BranchStatus::RefNotFound => println!("{}: ref not found", branch.refname),
        BranchStatus::Checked { errors, warnings } => {
            if !ctx.quiet || !errors.is_empty() {
                println!(
                    "{}: {} error(s), {} warning(s)",
                    branch.refname,
                    errors.len(),
                    warnings.len()
                );
            }
            for issue in errors {
                println!("  error: {issue}");
            }
            if !ctx.quiet {
                for issue in warnings {
                    println!("  warning: {issue}");
                }
            }
        }
    }
}
