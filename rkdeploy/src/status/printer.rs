//! User-facing progress and summary lines.
//!
//! Every line the status check prints goes through this module so the
//! wording stays in one place. Cancelled resources print nothing, and a
//! resource's unchanged status is never repeated.

use std::io::Write;
use std::sync::Arc;

use tokio::sync::RwLock;

use super::codes::StatusCode;
use super::counter::Counts;
use super::resource::Resource;

/// Prints the one-line terminal summary for a resource that just
/// finished, with a pending tail while other resources are still being
/// watched. Cancelled resources are silent.
pub(crate) fn print_status_check_summary(out: &mut dyn Write, resource: &Resource, counts: Counts) {
    let status = resource.status();
    if status.code == StatusCode::UserCancelled {
        return;
    }

    let line = if status.code == StatusCode::Success {
        let mut line = format!(" - {} is ready.", resource.qualified_name());
        if counts.pending > 0 {
            line.push_str(&format!(
                " [{}/{} deployment(s) still pending]",
                counts.pending, counts.total
            ));
        }
        line
    } else {
        format!(
            " - {} failed. Error: {}.",
            resource.qualified_name(),
            trim_message(&status.message),
        )
    };

    let _ = writeln!(out, "{line}");
}

/// Prints the current status of every resource whose status changed
/// since it was last reported, one line per resource plus an indented
/// line per unhealthy pod. Returns true when every resource is done.
pub(crate) async fn print_status(out: &mut dyn Write, resources: &[Arc<RwLock<Resource>>]) -> bool {
    let mut all_done = true;
    for resource in resources {
        let mut res = resource.write().await;
        if res.is_complete() {
            continue;
        }
        all_done = false;

        if !res.changed() || res.status().code == StatusCode::UserCancelled {
            continue;
        }
        print_progress(out, &res);
        res.mark_reported();
    }
    all_done
}

/// One resource's in-flight status line plus its pod diagnostics.
pub(crate) fn print_progress(out: &mut dyn Write, resource: &Resource) {
    let _ = writeln!(
        out,
        " - {}: {}",
        resource.qualified_name(),
        trim_message(&resource.status().message),
    );
    for pod in resource.pod_statuses() {
        if pod.ae.code == StatusCode::Success {
            continue;
        }
        let _ = writeln!(
            out,
            "    - {}: {}",
            pod.qualified_name(),
            trim_message(&pod.ae.message),
        );
    }
}

fn trim_message(message: &str) -> &str {
    message.trim_end().trim_end_matches('.')
}
