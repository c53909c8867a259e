/// Room grouping and staleness checks.
///
/// Buckets are recomputed on every call from the parsed rooms; nothing is
/// cached between calls.
use chrono::{DateTime, Months, Utc};
use serde::Serialize;
use std::fmt;

use crate::room::ParsedRoom;

/// Rooms grouped by member count and real message count.
///
/// The four leaf buckets partition `all_rooms`.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomBuckets {
    pub all_rooms: Vec<ParsedRoom>,
    pub single_rooms_many_messages: Vec<ParsedRoom>,
    pub single_rooms_no_messages: Vec<ParsedRoom>,
    pub many_members_no_messages: Vec<ParsedRoom>,
    pub many_members_many_messages: Vec<ParsedRoom>,
}

/// Selector for one of the `RoomBuckets` groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bucket {
    AllRooms,
    SingleRoomsManyMessages,
    SingleRoomsNoMessages,
    ManyMembersNoMessages,
    ManyMembersManyMessages,
}

impl Bucket {
    pub const ALL: [Bucket; 5] = [
        Bucket::AllRooms,
        Bucket::SingleRoomsManyMessages,
        Bucket::SingleRoomsNoMessages,
        Bucket::ManyMembersNoMessages,
        Bucket::ManyMembersManyMessages,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Bucket::AllRooms => "allRooms",
            Bucket::SingleRoomsManyMessages => "singleRoomsManyMessages",
            Bucket::SingleRoomsNoMessages => "singleRoomsNoMessages",
            Bucket::ManyMembersNoMessages => "manyMembersNoMessages",
            Bucket::ManyMembersManyMessages => "manyMembersManyMessages",
        }
    }
}

impl fmt::Display for Bucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl RoomBuckets {
    pub fn get(&self, bucket: Bucket) -> &[ParsedRoom] {
        match bucket {
            Bucket::AllRooms => &self.all_rooms,
            Bucket::SingleRoomsManyMessages => &self.single_rooms_many_messages,
            Bucket::SingleRoomsNoMessages => &self.single_rooms_no_messages,
            Bucket::ManyMembersNoMessages => &self.many_members_no_messages,
            Bucket::ManyMembersManyMessages => &self.many_members_many_messages,
        }
    }
}

/// Partitions rooms into buckets in one pass, keeping input order.
pub fn classify(rooms: Vec<ParsedRoom>) -> RoomBuckets {
    let mut buckets = RoomBuckets::default();
    for room in &rooms {
        // (several members, no real messages)
        let target = match (room.members.len() > 1, room.messages.is_empty()) {
            (false, false) => &mut buckets.single_rooms_many_messages,
            (false, true) => &mut buckets.single_rooms_no_messages,
            (true, true) => &mut buckets.many_members_no_messages,
            (true, false) => &mut buckets.many_members_many_messages,
        };
        target.push(room.clone());
    }
    buckets.all_rooms = rooms;
    buckets
}

/// Millisecond timestamp `months_limit` calendar months before `now`.
///
/// Negative limits move forward in time. When the arithmetic leaves chrono's
/// range the result saturates, so everything (or nothing) ends up outdated.
pub fn limit_timestamp(now: DateTime<Utc>, months_limit: i64) -> i64 {
    let shifted = match u32::try_from(months_limit.unsigned_abs()) {
        Ok(n) if months_limit >= 0 => now.checked_sub_months(Months::new(n)),
        Ok(n) => now.checked_add_months(Months::new(n)),
        Err(_) => None,
    };
    match shifted {
        Some(date) => date.timestamp_millis(),
        None if months_limit >= 0 => i64::MIN,
        None => i64::MAX,
    }
}

/// Rooms whose last message is strictly older than `months_limit` months.
///
/// Rooms without any message event are left out. The result is sorted by
/// last activity, most recent first.
pub fn outdated(rooms: &[ParsedRoom], months_limit: i64, now: DateTime<Utc>) -> Vec<ParsedRoom> {
    let limit = limit_timestamp(now, months_limit);
    let mut result: Vec<ParsedRoom> = rooms
        .iter()
        .filter(|room| room.last_timestamp().is_some_and(|ts| ts < limit))
        .cloned()
        .collect();
    result.sort_by(|a, b| b.last_timestamp().cmp(&a.last_timestamp()));
    result
}

/// Looks like a direct chat: exactly two members and a name that is not
/// plain ASCII (direct chats are named after the other person).
pub fn is_direct_chat(room: &ParsedRoom) -> bool {
    room.members.len() == 2 && !room.room_name.is_ascii()
}
