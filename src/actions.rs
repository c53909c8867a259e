/// Interactive menu actions.
///
/// Each menu entry is an `Action` variant; `run_action` is the dispatch table.
/// Bulk flows share the same tail: retry failed rooms, show errors, save the
/// report.
use anyhow::{Context, Result};
use std::future::Future;
use std::path::PathBuf;

use crate::ask::Ask;
use crate::classifier::{Bucket, RoomBuckets};
use crate::client::ChatClient;
use crate::config::{is_valid_months_limit, parse_ignore_users};
use crate::export::save_to_json;
use crate::report::{retry_failed, OperationReport};
use crate::room::{ParsedRoom, RoomRef};
use crate::service::{LeaveOptions, OutgoingMessage, RoomService, DEFAULT_POWER_LEVEL};

/// Months without activity proposed for the outdated rooms search.
pub const DEFAULT_MONTHS_LIMIT: i64 = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    LeaveOutdated,
    LeaveEmpty,
    LeaveByName,
    Invite,
    JoinInvited,
    SetPower,
    SendMessage,
    DeleteAlias,
    ShowStats,
    Stop,
}

impl Action {
    /// Menu order.
    pub const ALL: [Action; 10] = [
        Action::LeaveOutdated,
        Action::LeaveEmpty,
        Action::LeaveByName,
        Action::Invite,
        Action::JoinInvited,
        Action::SetPower,
        Action::SendMessage,
        Action::DeleteAlias,
        Action::ShowStats,
        Action::Stop,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Action::LeaveOutdated => "Leave rooms without recent activity",
            Action::LeaveEmpty => "Leave rooms where you are alone and nobody wrote",
            Action::LeaveByName => "Leave rooms by name",
            Action::Invite => "Invite a user to rooms",
            Action::JoinInvited => "Join rooms you are invited to",
            Action::SetPower => "Set a user's power level in rooms",
            Action::SendMessage => "Send a message to rooms",
            Action::DeleteAlias => "Delete a room alias",
            Action::ShowStats => "Show room statistics",
            Action::Stop => "Stop",
        }
    }
}

/// Whether the menu keeps going after an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Stop,
}

pub struct ActionContext<'a, C, A> {
    pub service: &'a RoomService<C>,
    pub ask: &'a A,
    /// Where saved reports go.
    pub export_dir: PathBuf,
}

/// Shows the menu until the operator stops or interrupts.
pub async fn run_menu<C: ChatClient, A: Ask>(ctx: &ActionContext<'_, C, A>) -> Result<()> {
    let labels: Vec<String> = Action::ALL.iter().map(|a| a.label().to_owned()).collect();
    loop {
        let action = match ctx.ask.select("What do you want to do?", &labels) {
            Ok(index) => Action::ALL
                .get(index)
                .copied()
                .context("menu selection out of range")?,
            Err(e) if is_interrupt(&e) || is_cancel(&e) => Action::Stop,
            Err(e) => return Err(e),
        };

        match run_action(action, ctx).await {
            Ok(Flow::Stop) => return Ok(()),
            Ok(Flow::Continue) => {}
            Err(e) if is_interrupt(&e) => {
                run_action(Action::Stop, ctx).await?;
                return Ok(());
            }
            Err(e) if is_cancel(&e) => {}
            Err(e) => {
                tracing::error!(?action, error = %e, "Action failed");
                eprintln!("Error: {:#}", e);
            }
        }
    }
}

fn is_interrupt(e: &anyhow::Error) -> bool {
    matches!(
        e.downcast_ref::<inquire::InquireError>(),
        Some(inquire::InquireError::OperationInterrupted)
    )
}

fn is_cancel(e: &anyhow::Error) -> bool {
    matches!(
        e.downcast_ref::<inquire::InquireError>(),
        Some(inquire::InquireError::OperationCanceled)
    )
}

pub async fn run_action<C: ChatClient, A: Ask>(
    action: Action,
    ctx: &ActionContext<'_, C, A>,
) -> Result<Flow> {
    tracing::info!(?action, "Running action");
    match action {
        Action::LeaveOutdated => leave_outdated(ctx).await?,
        Action::LeaveEmpty => leave_empty(ctx).await?,
        Action::LeaveByName => leave_by_name(ctx).await?,
        Action::Invite => invite(ctx).await?,
        Action::JoinInvited => join_invited(ctx).await?,
        Action::SetPower => set_power(ctx).await?,
        Action::SendMessage => send_message(ctx).await?,
        Action::DeleteAlias => delete_alias(ctx).await?,
        Action::ShowStats => show_stats(ctx).await?,
        Action::Stop => {
            ctx.service.stop().await;
            eprintln!("Bye!");
            return Ok(Flow::Stop);
        }
    }
    Ok(Flow::Continue)
}

fn validate_months(months: i64) -> Option<&'static str> {
    if is_valid_months_limit(months) {
        None
    } else {
        Some("Enter a number of months from 1 to 12")
    }
}

fn validate_power_level(level: i64) -> Option<&'static str> {
    if (0..=100).contains(&level) {
        None
    } else {
        Some("Power level must be between 0 and 100")
    }
}

fn room_label(room: &RoomRef) -> String {
    match room.alias {
        Some(ref alias) => format!("{} ({})", room.room_name, alias),
        None => format!("{} ({})", room.room_name, room.room_id),
    }
}

fn print_rooms(rooms: &[RoomRef]) {
    for room in rooms {
        println!("  {}", room_label(room));
    }
}

async fn leave_outdated<C: ChatClient, A: Ask>(ctx: &ActionContext<'_, C, A>) -> Result<()> {
    let months = ctx.ask.number(
        "How many months without messages?",
        DEFAULT_MONTHS_LIMIT,
        validate_months,
    )?;
    let rooms = ctx.service.get_outdated_rooms(months).await;
    if rooms.is_empty() {
        eprintln!("No rooms without messages for {} months.", months);
        return Ok(());
    }

    if ctx.ask.confirm(&format!("Show {} outdated rooms?", rooms.len()), true)? {
        for room in &rooms {
            let last = room
                .last_message_date
                .map(|d| d.date.format("%Y-%m-%d").to_string())
                .unwrap_or_default();
            println!("  {}  last message {}", room.room_name, last);
        }
    }
    leave_flow(ctx, to_refs(&rooms)).await
}

async fn leave_empty<C: ChatClient, A: Ask>(ctx: &ActionContext<'_, C, A>) -> Result<()> {
    let buckets = classify_with_ignored(ctx).await?;
    let rooms = to_refs(buckets.get(Bucket::SingleRoomsNoMessages));
    if rooms.is_empty() {
        eprintln!("No single-member rooms without messages.");
        return Ok(());
    }
    if ctx.ask.confirm(&format!("Show {} rooms?", rooms.len()), true)? {
        print_rooms(&rooms);
    }
    leave_flow(ctx, rooms).await
}

async fn leave_by_name<C: ChatClient, A: Ask>(ctx: &ActionContext<'_, C, A>) -> Result<()> {
    let fragment = ctx.ask.text("Part of the room name:", None)?;
    let found = ctx.service.rooms_by_name(fragment.trim()).await;
    if found.is_empty() {
        eprintln!("No rooms matching \"{}\".", fragment.trim());
        return Ok(());
    }
    let rooms = choose_rooms(ctx.ask, "Rooms to leave:", to_refs(&found))?;
    leave_flow(ctx, rooms).await
}

/// Confirms and leaves `rooms`, optionally deleting their aliases.
async fn leave_flow<C: ChatClient, A: Ask>(
    ctx: &ActionContext<'_, C, A>,
    rooms: Vec<RoomRef>,
) -> Result<()> {
    if rooms.is_empty() || !ctx.ask.confirm(&format!("Leave {} rooms?", rooms.len()), false)? {
        return Ok(());
    }
    let delete_alias = rooms.iter().any(|r| r.alias.is_some())
        && ctx.ask.confirm("Also delete the aliases of these rooms?", false)?;
    let options = LeaveOptions { delete_alias };

    let service = ctx.service;
    let report = service.leave_rooms(rooms, options).await;
    finish_report(ctx, report, move |failed| service.leave_rooms(failed, options)).await?;
    Ok(())
}

async fn invite<C: ChatClient, A: Ask>(ctx: &ActionContext<'_, C, A>) -> Result<()> {
    let Some(user_id) = ask_known_user(ctx, "Who do you want to invite?").await? else {
        return Ok(());
    };
    let rooms = pick_rooms(ctx, "Rooms to invite to:").await?;
    if rooms.is_empty()
        || !ctx
            .ask
            .confirm(&format!("Invite {} to {} rooms?", user_id, rooms.len()), false)?
    {
        return Ok(());
    }

    let service = ctx.service;
    let user_id = user_id.as_str();
    let report = service.invite_user_to_rooms(rooms, user_id).await;
    finish_report(ctx, report, move |failed| {
        service.invite_user_to_rooms(failed, user_id)
    })
    .await?;
    Ok(())
}

async fn join_invited<C: ChatClient, A: Ask>(ctx: &ActionContext<'_, C, A>) -> Result<()> {
    let invited = ctx.service.invited_rooms().await;
    if invited.is_empty() {
        eprintln!("You have no pending invites.");
        return Ok(());
    }
    let rooms = choose_rooms(ctx.ask, "Rooms to join:", invited)?;
    if rooms.is_empty() || !ctx.ask.confirm(&format!("Join {} rooms?", rooms.len()), true)? {
        return Ok(());
    }

    let service = ctx.service;
    let report = service.join_rooms(rooms).await;
    finish_report(ctx, report, move |failed| service.join_rooms(failed)).await?;
    Ok(())
}

async fn set_power<C: ChatClient, A: Ask>(ctx: &ActionContext<'_, C, A>) -> Result<()> {
    let Some(user_id) = ask_known_user(ctx, "Whose power level do you want to change?").await? else {
        return Ok(());
    };
    let level = ctx
        .ask
        .number("Power level:", DEFAULT_POWER_LEVEL, validate_power_level)?;
    let rooms = pick_rooms(ctx, "Rooms to change:").await?;
    if rooms.is_empty()
        || !ctx.ask.confirm(
            &format!("Set power level {} for {} in {} rooms?", level, user_id, rooms.len()),
            false,
        )?
    {
        return Ok(());
    }

    let service = ctx.service;
    let user_id = user_id.as_str();
    let report = service.set_power_on_rooms(rooms, user_id, Some(level)).await;
    finish_report(ctx, report, move |failed| {
        service.set_power_on_rooms(failed, user_id, Some(level))
    })
    .await?;
    Ok(())
}

async fn send_message<C: ChatClient, A: Ask>(ctx: &ActionContext<'_, C, A>) -> Result<()> {
    let rooms = pick_rooms(ctx, "Rooms to send to:").await?;
    if rooms.is_empty() {
        return Ok(());
    }
    let text = ctx.ask.text("Message:", None)?;
    if text.trim().is_empty() {
        eprintln!("Empty message, nothing sent.");
        return Ok(());
    }
    if !ctx
        .ask
        .confirm(&format!("Send the message to {} rooms?", rooms.len()), false)?
    {
        return Ok(());
    }

    let service = ctx.service;
    let message = OutgoingMessage::text(&text);
    let message = &message;
    let report = service.send_message_to_rooms(rooms, message).await;
    finish_report(ctx, report, move |failed| {
        service.send_message_to_rooms(failed, message)
    })
    .await?;
    Ok(())
}

async fn delete_alias<C: ChatClient, A: Ask>(ctx: &ActionContext<'_, C, A>) -> Result<()> {
    let name = ctx.ask.text("Alias to delete (without # and domain):", None)?;
    let name = name.trim();
    let alias = ctx.service.room_alias(name);
    let Some(room_id) = ctx.service.room_id_by_alias(name).await else {
        eprintln!("Alias {} not found.", alias);
        return Ok(());
    };
    if !ctx
        .ask
        .confirm(&format!("Delete {} pointing to {}?", alias, room_id), false)?
    {
        return Ok(());
    }
    match ctx.service.delete_alias(name).await {
        Ok(()) => eprintln!("Alias {} deleted.", alias),
        Err(e) => eprintln!("Could not delete {}: {}", alias, e),
    }
    Ok(())
}

async fn show_stats<C: ChatClient, A: Ask>(ctx: &ActionContext<'_, C, A>) -> Result<()> {
    let buckets = classify_with_ignored(ctx).await?;
    for bucket in Bucket::ALL {
        println!("{:<28} {}", bucket.label(), buckets.get(bucket).len());
    }
    Ok(())
}

/// Asks whose messages should not count, then groups the rooms.
///
/// The configured list is the default answer. The outdated search does not
/// ask: ignored senders still count for the last message date.
async fn classify_with_ignored<C: ChatClient, A: Ask>(
    ctx: &ActionContext<'_, C, A>,
) -> Result<RoomBuckets> {
    let configured = ctx.service.ignored_senders().join(", ");
    let answer = ctx.ask.text(
        "Users whose messages do not count (comma or space separated):",
        Some(&configured),
    )?;
    let ignored = parse_ignore_users(&answer);
    tracing::debug!(?ignored, "Ignored senders");
    Ok(ctx.service.classify_and_parse(&ignored).await)
}

fn to_refs(rooms: &[ParsedRoom]) -> Vec<RoomRef> {
    rooms.iter().map(RoomRef::from).collect()
}

/// Lets the operator narrow `rooms` down; everything starts selected.
fn choose_rooms<A: Ask>(ask: &A, message: &str, rooms: Vec<RoomRef>) -> Result<Vec<RoomRef>> {
    if rooms.is_empty() {
        return Ok(rooms);
    }
    let labels: Vec<String> = rooms.iter().map(room_label).collect();
    let picked = ask.multi_select(message, &labels, true)?;
    Ok(picked
        .into_iter()
        .filter_map(|index| rooms.get(index).cloned())
        .collect())
}

/// Picks a bucket, then rooms inside it.
async fn pick_rooms<C: ChatClient, A: Ask>(
    ctx: &ActionContext<'_, C, A>,
    message: &str,
) -> Result<Vec<RoomRef>> {
    let buckets = classify_with_ignored(ctx).await?;
    let labels: Vec<String> = Bucket::ALL
        .iter()
        .map(|b| format!("{} ({})", b.label(), buckets.get(*b).len()))
        .collect();
    let index = ctx.ask.select("Which rooms?", &labels)?;
    let bucket = Bucket::ALL
        .get(index)
        .copied()
        .context("bucket selection out of range")?;
    choose_rooms(ctx.ask, message, to_refs(buckets.get(bucket)))
}

/// Asks for a user name and resolves it against the users seen in rooms.
async fn ask_known_user<C: ChatClient, A: Ask>(
    ctx: &ActionContext<'_, C, A>,
    message: &str,
) -> Result<Option<String>> {
    let name = ctx.ask.text(message, None)?;
    match ctx.service.user(name.trim()).await {
        Some(user) => Ok(Some(user.user_id)),
        None => {
            eprintln!("Unknown user {}.", ctx.service.user_id(name.trim()));
            Ok(None)
        }
    }
}

fn print_summary<R: OperationReport>(report: &R) {
    eprintln!(
        "{}: {} rooms, failed: {}",
        R::LABEL,
        report.done().len(),
        report.failed().len()
    );
}

/// Retry, error display and export shared by all bulk flows.
async fn finish_report<C, A, R, F, Fut>(
    ctx: &ActionContext<'_, C, A>,
    report: R,
    run: F,
) -> Result<R>
where
    A: Ask,
    R: OperationReport,
    F: FnMut(Vec<RoomRef>) -> Fut,
    Fut: Future<Output = R>,
{
    let ask = ctx.ask;
    let report = retry_failed(report, run, |current: &R| {
        print_summary(current);
        ask.confirm(
            &format!("Try again for {} failed rooms?", current.failed().len()),
            true,
        )
    })
    .await?;
    print_summary(&report);

    if !report.errors().is_empty() && ask.confirm("Show errors?", false)? {
        for error in report.errors() {
            eprintln!("  {}", error);
        }
    }
    if ask.confirm("Save results to a JSON file?", false)? {
        let path = save_to_json(&report, R::LABEL, &ctx.export_dir)?;
        eprintln!("Saved to {}", path.display());
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn menu_ends_with_stop() {
        assert_eq!(Action::ALL.len(), 10);
        assert_eq!(Action::ALL[0], Action::LeaveOutdated);
        assert_eq!(Action::ALL[9], Action::Stop);
    }

    #[test]
    fn labels_are_unique() {
        let mut labels: Vec<_> = Action::ALL.iter().map(|a| a.label()).collect();
        labels.sort();
        labels.dedup();
        assert_eq!(labels.len(), Action::ALL.len());
    }

    #[test]
    fn validators() {
        assert!(validate_months(6).is_none());
        assert!(validate_months(0).is_some());
        assert!(validate_power_level(100).is_none());
        assert!(validate_power_level(101).is_some());
    }

    #[test]
    fn room_label_prefers_alias() {
        let room = RoomRef::new("!a:m", "ops");
        assert_eq!(room_label(&room), "ops (!a:m)");
        assert_eq!(room_label(&room.with_alias("#ops:m")), "ops (#ops:m)");
    }
}
