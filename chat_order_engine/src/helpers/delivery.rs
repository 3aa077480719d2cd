use chrono::{Datelike, Duration, NaiveDate, Weekday};

/// The next occurrence of `target` strictly after `today`. If today already is the target weekday, delivery rolls
/// to next week (+7 days); same-day delivery is never scheduled.
pub fn next_delivery_date(today: NaiveDate, target: Weekday) -> NaiveDate {
    let today_idx = today.weekday().num_days_from_monday();
    let target_idx = target.num_days_from_monday();
    let mut days_ahead = (target_idx + 7 - today_idx) % 7;
    if days_ahead == 0 {
        days_ahead = 7;
    }
    today + Duration::days(i64::from(days_ahead))
}

#[cfg(test)]
mod test {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn rolls_forward_to_target_weekday() {
        // 2024-06-03 is a Monday
        assert_eq!(next_delivery_date(date(2024, 6, 3), Weekday::Sat), date(2024, 6, 8));
        assert_eq!(next_delivery_date(date(2024, 6, 7), Weekday::Sat), date(2024, 6, 8));
    }

    #[test]
    fn same_weekday_rolls_a_full_week() {
        // 2024-06-08 is a Saturday
        assert_eq!(next_delivery_date(date(2024, 6, 8), Weekday::Sat), date(2024, 6, 15));
    }

    #[test]
    fn day_after_target_waits_six_days() {
        // 2024-06-09 is a Sunday
        assert_eq!(next_delivery_date(date(2024, 6, 9), Weekday::Sat), date(2024, 6, 15));
    }
}
