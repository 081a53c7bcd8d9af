//! View-ready slices of the session model.
//!
//! Pure functions: no I/O, no side effects, safe to call on every render.
//! The feed order is ascending by `created_at` (post id breaks ties); the
//! personal history is the one place that runs newest first.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use haru_shared::{BucketCalendar, Comment, DateKey, Group, Post, Uid, User};

fn feed_order(a: &&Post, b: &&Post) -> std::cmp::Ordering {
    a.created_at
        .cmp(&b.created_at)
        .then_with(|| a.post_id.cmp(&b.post_id))
}

/// Posts from today's bucket day, oldest first.
pub fn todays_posts<'a>(group: &'a Group, now: DateTime<Utc>, calendar: &BucketCalendar) -> Vec<&'a Post> {
    let mut posts: Vec<&Post> = group
        .all_posts()
        .filter(|p| p.is_today(now, calendar))
        .collect();
    posts.sort_by(feed_order);
    posts
}

/// One day's bucket in feed order. Empty when the day has no posts.
pub fn posts_by_date_key<'a>(group: &'a Group, key: &DateKey) -> Vec<&'a Post> {
    let mut posts: Vec<&Post> = group
        .posts_by_date
        .get(key)
        .map(|bucket| bucket.values().collect())
        .unwrap_or_default();
    posts.sort_by(feed_order);
    posts
}

/// A member's post history: newest date key first, newest post first
/// within a day.
pub fn posts_by_user_desc<'a>(group: &'a Group, uid: &Uid) -> Vec<&'a Post> {
    let mut posts = Vec::new();
    for bucket in group.posts_by_date.values().rev() {
        let mut day: Vec<&Post> = bucket.values().filter(|p| p.is_authored_by(uid)).collect();
        day.sort_by(|a, b| feed_order(b, a));
        posts.extend(day);
    }
    posts
}

/// `self_uid` first, then ascending registration date, uid breaking ties.
pub fn roster_sorted_for_display<'a>(roster: &'a BTreeMap<Uid, User>, self_uid: &Uid) -> Vec<&'a User> {
    let mut users: Vec<&User> = roster.values().collect();
    users.sort_by(|a, b| {
        (&a.uid != self_uid)
            .cmp(&(&b.uid != self_uid))
            .then_with(|| a.register_date.cmp(&b.register_date))
            .then_with(|| a.uid.cmp(&b.uid))
    });
    users
}

pub fn has_posted_today(group: &Group, uid: &Uid, now: DateTime<Utc>, calendar: &BucketCalendar) -> bool {
    todays_posts(group, now, calendar)
        .iter()
        .any(|p| p.is_authored_by(uid))
}

/// The first post of every day in feed order, for the calendar grid.
pub fn calendar_thumbnails(group: &Group) -> BTreeMap<DateKey, &Post> {
    group
        .posts_by_date
        .iter()
        .filter_map(|(key, bucket)| {
            bucket
                .values()
                .min_by(|a, b| feed_order(a, b))
                .map(|post| (key.clone(), post))
        })
        .collect()
}

/// Comments oldest first, each showing the commenter's current profile
/// image from the roster. A commenter missing from the roster keeps the
/// stored image.
pub fn comments_for_display(post: &Post, roster: &BTreeMap<Uid, User>) -> Vec<Comment> {
    let mut comments: Vec<Comment> = post
        .comments
        .values()
        .map(|c| {
            let mut c = c.clone();
            if let Some(member) = roster.get(&c.user_id) {
                c.profile_image_url = member.profile_image_url.clone();
            }
            c
        })
        .collect();
    comments.sort_by(|a, b| {
        a.created_at
            .cmp(&b.created_at)
            .then_with(|| a.comment_id.cmp(&b.comment_id))
    });
    comments
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use haru_shared::{CommentId, Gender, GroupId, LoginPlatform, PostId};

    fn now() -> DateTime<Utc> {
        // 2025-06-17 21:00 KST
        Utc.with_ymd_and_hms(2025, 6, 17, 12, 0, 0).unwrap()
    }

    fn post(id: &str, uid: &str, at: DateTime<Utc>) -> Post {
        Post {
            post_id: PostId::from(id),
            user_id: Uid::from(uid),
            nickname: uid.to_string(),
            profile_image_url: None,
            image_url: format!("memory://{id}.jpg"),
            created_at: at,
            like_count: 0,
            comments: BTreeMap::new(),
        }
    }

    fn group_with(posts: Vec<Post>) -> Group {
        let cal = BucketCalendar::default();
        let mut group = Group {
            group_id: GroupId::from("g1"),
            group_name: "family".into(),
            created_at: now() - Duration::days(30),
            host_user_id: Uid::from("a"),
            invite_code: "ABC123".into(),
            members: BTreeMap::new(),
            posts_by_date: BTreeMap::new(),
        };
        for p in posts {
            group.insert_post(cal.date_key(p.created_at), p);
        }
        group
    }

    fn user(uid: &str, registered_day: u32, image: Option<&str>) -> User {
        User {
            uid: Uid::from(uid),
            register_date: Utc.with_ymd_and_hms(2025, 1, registered_day, 0, 0, 0).unwrap(),
            login_platform: LoginPlatform::Kakao,
            nickname: uid.to_string(),
            profile_image_url: image.map(str::to_string),
            fcm_token: None,
            birthday_date: Utc.with_ymd_and_hms(2000, 1, 1, 0, 0, 0).unwrap(),
            gender: Gender::Other,
            is_push_enabled: false,
            group_id: Some(GroupId::from("g1")),
        }
    }

    fn ids(posts: &[&Post]) -> Vec<String> {
        posts.iter().map(|p| p.post_id.to_string()).collect()
    }

    #[test]
    fn todays_posts_excludes_earlier_days() {
        let group = group_with(vec![
            post("p2d", "a", now() - Duration::days(2)),
            post("p1d", "a", now() - Duration::days(1)),
            post("p0", "a", now()),
        ]);
        let cal = BucketCalendar::default();
        assert_eq!(ids(&todays_posts(&group, now(), &cal)), vec!["p0"]);
    }

    #[test]
    fn todays_posts_run_oldest_first() {
        let group = group_with(vec![
            post("late", "a", now() - Duration::hours(1)),
            post("early", "b", now() - Duration::hours(3)),
        ]);
        let cal = BucketCalendar::default();
        assert_eq!(ids(&todays_posts(&group, now(), &cal)), vec!["early", "late"]);
    }

    #[test]
    fn today_follows_the_bucket_timezone() {
        // 2025-06-17 23:30 KST and 2025-06-18 00:30 KST
        let before = Utc.with_ymd_and_hms(2025, 6, 17, 14, 30, 0).unwrap();
        let after = Utc.with_ymd_and_hms(2025, 6, 17, 15, 30, 0).unwrap();
        let group = group_with(vec![post("before", "a", before), post("after", "a", after)]);
        let cal = BucketCalendar::default();

        let at = Utc.with_ymd_and_hms(2025, 6, 17, 16, 0, 0).unwrap();
        assert_eq!(ids(&todays_posts(&group, at, &cal)), vec!["after"]);
        let key = DateKey::parse("2025-06-18").unwrap();
        assert_eq!(ids(&posts_by_date_key(&group, &key)), vec!["after"]);
    }

    #[test]
    fn posts_by_date_key_missing_day_is_empty() {
        let group = group_with(vec![post("p0", "a", now())]);
        let key = DateKey::parse("2020-01-01").unwrap();
        assert!(posts_by_date_key(&group, &key).is_empty());
    }

    #[test]
    fn personal_history_runs_newest_first() {
        let group = group_with(vec![
            post("old", "a", now() - Duration::days(3)),
            post("other", "b", now() - Duration::days(1)),
            post("mid", "a", now() - Duration::days(1)),
            post("new", "a", now()),
        ]);
        assert_eq!(
            ids(&posts_by_user_desc(&group, &Uid::from("a"))),
            vec!["new", "mid", "old"]
        );
    }

    #[test]
    fn roster_puts_self_first_then_registration_order() {
        let mut roster = BTreeMap::new();
        for u in [user("A", 5, None), user("B", 1, None), user("C", 3, None)] {
            roster.insert(u.uid.clone(), u);
        }
        let sorted: Vec<&str> = roster_sorted_for_display(&roster, &Uid::from("B"))
            .iter()
            .map(|u| u.uid.as_str())
            .collect();
        assert_eq!(sorted, vec!["B", "C", "A"]);

        let sorted: Vec<&str> = roster_sorted_for_display(&roster, &Uid::from("A"))
            .iter()
            .map(|u| u.uid.as_str())
            .collect();
        assert_eq!(sorted, vec!["A", "B", "C"]);
    }

    #[test]
    fn roster_ties_break_by_uid() {
        let mut roster = BTreeMap::new();
        for u in [user("z", 2, None), user("y", 2, None), user("me", 9, None)] {
            roster.insert(u.uid.clone(), u);
        }
        let sorted: Vec<&str> = roster_sorted_for_display(&roster, &Uid::from("me"))
            .iter()
            .map(|u| u.uid.as_str())
            .collect();
        assert_eq!(sorted, vec!["me", "y", "z"]);
    }

    #[test]
    fn has_posted_today_checks_author() {
        let group = group_with(vec![
            post("p0", "a", now()),
            post("p1", "b", now() - Duration::days(1)),
        ]);
        let cal = BucketCalendar::default();
        assert!(has_posted_today(&group, &Uid::from("a"), now(), &cal));
        assert!(!has_posted_today(&group, &Uid::from("b"), now(), &cal));
    }

    #[test]
    fn thumbnails_pick_first_post_of_each_day() {
        let group = group_with(vec![
            post("d1-late", "a", now() - Duration::days(1)),
            post("d1-early", "b", now() - Duration::days(1) - Duration::hours(2)),
            post("d0", "a", now()),
        ]);
        let thumbs = calendar_thumbnails(&group);
        assert_eq!(thumbs.len(), 2);
        assert_eq!(thumbs[&DateKey::parse("2025-06-16").unwrap()].post_id.as_str(), "d1-early");
        assert_eq!(thumbs[&DateKey::parse("2025-06-17").unwrap()].post_id.as_str(), "d0");
    }

    #[test]
    fn comment_images_come_from_the_roster() {
        let mut p = post("p0", "a", now());
        for (id, uid, minutes) in [("c2", "b", 5), ("c1", "ghost", 1)] {
            p.comments.insert(
                CommentId::from(id),
                Comment {
                    comment_id: CommentId::from(id),
                    user_id: Uid::from(uid),
                    nickname: uid.to_string(),
                    profile_image_url: Some("stale.jpg".into()),
                    text: "hi".into(),
                    created_at: now() + Duration::minutes(minutes),
                },
            );
        }
        let mut roster = BTreeMap::new();
        roster.insert(Uid::from("b"), user("b", 1, Some("fresh.jpg")));

        let shown = comments_for_display(&p, &roster);
        assert_eq!(shown[0].comment_id.as_str(), "c1");
        assert_eq!(shown[0].profile_image_url.as_deref(), Some("stale.jpg"));
        assert_eq!(shown[1].comment_id.as_str(), "c2");
        assert_eq!(shown[1].profile_image_url.as_deref(), Some("fresh.jpg"));
        // the stored snapshot is left alone
        assert_eq!(
            p.comments[&CommentId::from("c2")].profile_image_url.as_deref(),
            Some("stale.jpg")
        );
    }
}
