/// Bucket timezone offset in seconds (UTC+09:00, Asia/Seoul has no DST)
pub const DEFAULT_BUCKET_UTC_OFFSET_SECS: i32 = 9 * 3600;

/// Length of a generated invite code
pub const DEFAULT_INVITE_CODE_LEN: usize = 6;

/// How many fresh invite codes to try before giving up on a collision
pub const DEFAULT_INVITE_CODE_ATTEMPTS: u32 = 5;

/// Minimum trimmed length of a group name
pub const DEFAULT_MIN_GROUP_NAME_LEN: usize = 2;

/// Alphabet for invite codes
pub const INVITE_CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Local cache slot keys
pub const CACHE_KEY_USER: &str = "cachedUser";
pub const CACHE_KEY_GROUP: &str = "cachedGroup";
pub const CACHE_KEY_NOTIFICATIONS: &str = "notificationsEnabled";
