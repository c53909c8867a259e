/// Operation specific result shapes and the caller driven retry loop.
use anyhow::Result;
use serde::Serialize;
use std::future::Future;
use tracing::info;

use crate::batch::{BatchResult, RoomError};
use crate::room::RoomRef;

/// Common view over the per-operation reports.
pub trait OperationReport: From<BatchResult> + Serialize {
    /// Label used for exported file names.
    const LABEL: &'static str;

    fn done(&self) -> &[RoomRef];
    fn failed(&self) -> &[RoomRef];
    fn errors(&self) -> &[RoomError];

    /// Folds the outcome of a retry over `failed()` into this report.
    fn absorb_retry(&mut self, retry: Self);
}

macro_rules! operation_report {
    ($(#[$meta:meta])* $name:ident, $label:literal, $done:ident, $failed:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
        #[serde(rename_all = "camelCase")]
        pub struct $name {
            pub errors: Vec<RoomError>,
            pub $done: Vec<RoomRef>,
            pub $failed: Vec<RoomRef>,
        }

        impl From<BatchResult> for $name {
            fn from(result: BatchResult) -> Self {
                Self {
                    errors: result.errors,
                    $done: result.succeeded,
                    $failed: result.failed,
                }
            }
        }

        impl OperationReport for $name {
            const LABEL: &'static str = $label;

            fn done(&self) -> &[RoomRef] {
                &self.$done
            }

            fn failed(&self) -> &[RoomRef] {
                &self.$failed
            }

            fn errors(&self) -> &[RoomError] {
                &self.errors
            }

            fn absorb_retry(&mut self, retry: Self) {
                self.$done.extend(retry.$done);
                self.$failed = retry.$failed;
                self.errors = retry.errors;
            }
        }
    };
}

operation_report!(
    /// Result of leaving rooms (`leavedRooms` / `errLeavedRooms`).
    LeaveReport,
    "leaved",
    leaved_rooms,
    err_leaved_rooms
);
operation_report!(
    /// Result of inviting a user (`invitedRooms` / `errInvitedRooms`).
    InviteReport,
    "invited",
    invited_rooms,
    err_invited_rooms
);
operation_report!(
    /// Result of joining rooms (`joinedRooms` / `errJoinedRooms`).
    JoinReport,
    "joined",
    joined_rooms,
    err_joined_rooms
);
operation_report!(
    /// Result of changing a power level (`poweredRooms` / `errPoweredRooms`).
    PowerReport,
    "powered",
    powered_rooms,
    err_powered_rooms
);
operation_report!(
    /// Result of sending a message (`sentRooms` / `errSentRooms`).
    SendReport,
    "sent",
    sent_rooms,
    err_sent_rooms
);

/// Re-runs `run` on the failed rooms for as long as there are failures and
/// `confirm` agrees.
///
/// Each round only touches the rooms that failed in the previous round.
/// Rooms that succeed are appended to the done list; `failed()` and `errors()`
/// always describe the latest round.
pub async fn retry_failed<R, F, Fut, C>(mut report: R, mut run: F, mut confirm: C) -> Result<R>
where
    R: OperationReport,
    F: FnMut(Vec<RoomRef>) -> Fut,
    Fut: Future<Output = R>,
    C: FnMut(&R) -> Result<bool>,
{
    let mut round = 0usize;
    while !report.failed().is_empty() && confirm(&report)? {
        round += 1;
        let failed = report.failed().to_vec();
        info!(
            label = R::LABEL,
            round,
            rooms = failed.len(),
            "Retrying failed rooms"
        );
        let retry = run(failed).await;
        report.absorb_retry(retry);
    }
    Ok(report)
}
