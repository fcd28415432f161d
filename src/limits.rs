/// Widest availability search window.
pub const MAX_QUERY_WINDOW_DAYS: i64 = 366;

/// Longest single reservation.
pub const MAX_STAY_NIGHTS: i64 = 90;

/// Longest single admin block.
pub const MAX_BLOCK_DAYS: i64 = 366;

pub const MAX_NAME_LEN: usize = 255;
pub const MAX_EMAIL_LEN: usize = 320;
pub const MAX_PHONE_LEN: usize = 64;
pub const MAX_ROOM_NAME_LEN: usize = 255;

pub const MAX_ROOMS: usize = 10_000;
pub const MAX_RESTRICTIONS_PER_ROOM: usize = 100_000;

/// Edits accepted from one calendar submission.
pub const MAX_CALENDAR_EDITS: usize = 4_096;

/// Calendar years the admin view accepts.
pub const MIN_CALENDAR_YEAR: i32 = 1970;
pub const MAX_CALENDAR_YEAR: i32 = 9999;
