//! Accounts that exist on the simulated backend before the session starts.

use chrono::{TimeZone, Utc};
use haru_shared::{paths, Gender, LoginPlatform, Uid, User, Wire};
use haru_sync::memory::MemoryRemoteStore;

pub const ME: &str = "uid-me";
pub const SISTER: &str = "uid-sister";

fn account(uid: &str, nickname: &str, registered_day: u32, gender: Gender) -> User {
    User {
        uid: Uid::from(uid),
        register_date: Utc
            .with_ymd_and_hms(2025, 3, registered_day, 9, 0, 0)
            .single()
            .unwrap_or_else(Utc::now),
        login_platform: LoginPlatform::Kakao,
        nickname: nickname.to_string(),
        profile_image_url: None,
        fcm_token: None,
        birthday_date: Utc
            .with_ymd_and_hms(1998, 5, 5, 0, 0, 0)
            .single()
            .unwrap_or_else(Utc::now),
        gender,
        is_push_enabled: true,
        group_id: None,
    }
}

pub fn seed_accounts(remote: &MemoryRemoteStore) {
    for user in [
        account(ME, "하루", 10, Gender::Female),
        account(SISTER, "언니", 2, Gender::Female),
    ] {
        remote.put(&paths::user(&user.uid), user.encode());
    }
}
