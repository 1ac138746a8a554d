use chrono::{DateTime, Duration, Months, NaiveDate, NaiveDateTime, TimeZone, Utc};

use crate::error::Error;

#[cfg(not(test))]
/// 現在のUTC時間を取得する。
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// テストでは時計を任意の時刻に止められる。
#[cfg(test)]
pub mod mock_datetime {
    use std::cell::Cell;

    use chrono::{DateTime, TimeZone, Utc};

    thread_local! {
        static FROZEN_AT: Cell<Option<DateTime<Utc>>> = const { Cell::new(None) };
    }

    /// 止めた時刻、止めていなければ現在時刻を返す。
    pub fn now() -> DateTime<Utc> {
        FROZEN_AT.with(Cell::get).unwrap_or_else(Utc::now)
    }

    /// dropされるまで時計を止めておくガード。
    #[must_use]
    pub struct FrozenClock(());

    impl Drop for FrozenClock {
        fn drop(&mut self) {
            FROZEN_AT.with(|cell| cell.set(None));
        }
    }

    /// 時計を`time`に止める。タイムゾーンは問わない。
    pub fn freeze_at<Z: TimeZone>(time: DateTime<Z>) -> FrozenClock {
        FROZEN_AT.with(|cell| cell.set(Some(time.with_timezone(&Utc))));
        FrozenClock(())
    }
}

#[cfg(test)]
pub use mock_datetime::now;

/// ユーザーのタイムゾーンでの現在時刻。
pub fn now_in<Z: TimeZone>(timezone: &Z) -> DateTime<Z> {
    now().with_timezone(timezone)
}

/// Clockifyが受け付ける形式のタイムスタンプに変換する。
///
/// ISO-8601と書かれているが、オフセットは常に`Z`でなければ受け付けられない。
/// そのためUTCに変換した上で`Z`を文字列として付与する。
pub fn to_iso_timestamp<Z: TimeZone>(datetime: &DateTime<Z>) -> String {
    format!(
        "{}Z",
        datetime.naive_utc().format("%Y-%m-%dT%H:%M:%S%.f")
    )
}

/// Clockifyのタイムスタンプをパースし、指定されたタイムゾーンに変換する。
///
/// オフセットのないタイムスタンプはUTCとして扱う。
pub fn from_iso_timestamp<Z: TimeZone>(
    timestamp: &str,
    timezone: &Z,
) -> Result<DateTime<Z>, chrono::ParseError> {
    let utc = match DateTime::parse_from_rfc3339(timestamp) {
        Ok(datetime) => datetime.with_timezone(&Utc),
        Err(err) => NaiveDateTime::parse_from_str(timestamp, "%Y-%m-%dT%H:%M:%S%.f")
            .map_err(|_| err)?
            .and_utc(),
    };

    Ok(utc.with_timezone(timezone))
}

/// ローカル時刻を指定されたタイムゾーンの時刻にする。
///
/// 夏時間の切り替えで2回現れる時刻は早い方を使う。存在しない時刻はエラーとする。
pub fn localize<Z: TimeZone>(timezone: &Z, naive: NaiveDateTime) -> Result<DateTime<Z>, Error> {
    timezone
        .from_local_datetime(&naive)
        .earliest()
        .ok_or_else(|| Error::usage(format!("Local time {naive} does not exist")))
}

/// 取得範囲の端になるローカル時刻を指定されたタイムゾーンの時刻にする。
///
/// `localize`と違い、夏時間の切り替えで飛ばされた時刻は切り替え後の最初の時刻にする。
fn window_bound<Z: TimeZone>(timezone: &Z, naive: NaiveDateTime) -> Result<DateTime<Z>, Error> {
    // 切り替えは15分単位で起きる
    (0..=24 * 4)
        .filter_map(|quarter| naive.checked_add_signed(Duration::minutes(15 * quarter)))
        .find_map(|candidate| timezone.from_local_datetime(&candidate).earliest())
        .ok_or_else(|| Error::usage(format!("Local time {naive} does not exist")))
}

/// 指定された日付の00:00:00から翌日の00:00:00までの範囲を返す。
pub fn day_window<Z: TimeZone>(
    date: NaiveDate,
    timezone: &Z,
) -> Result<(DateTime<Z>, DateTime<Z>), Error> {
    let next = date
        .succ_opt()
        .ok_or_else(|| Error::usage(format!("Date {date} is out of range")))?;

    Ok((
        window_bound(timezone, date.and_time(Default::default()))?,
        window_bound(timezone, next.and_time(Default::default()))?,
    ))
}

/// 指定された月の1日00:00:00から月末23:59:59.999までの範囲を返す。
pub fn month_window<Z: TimeZone>(
    year: i32,
    month: u32,
    timezone: &Z,
) -> Result<(DateTime<Z>, DateTime<Z>), Error> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)
        .ok_or_else(|| Error::usage(format!("Invalid month {year}-{month:02}")))?;
    let last = first
        .checked_add_months(Months::new(1))
        .and_then(|next| next.pred_opt())
        .ok_or_else(|| Error::usage(format!("Month {year}-{month:02} is out of range")))?;

    inclusive_window(first, last, timezone)
}

/// 指定された年の1月1日00:00:00から12月31日23:59:59.999までの範囲を返す。
pub fn year_window<Z: TimeZone>(
    year: i32,
    timezone: &Z,
) -> Result<(DateTime<Z>, DateTime<Z>), Error> {
    let first = NaiveDate::from_ymd_opt(year, 1, 1)
        .ok_or_else(|| Error::usage(format!("Invalid year {year}")))?;
    let last = NaiveDate::from_ymd_opt(year, 12, 31)
        .ok_or_else(|| Error::usage(format!("Invalid year {year}")))?;

    inclusive_window(first, last, timezone)
}

fn inclusive_window<Z: TimeZone>(
    first: NaiveDate,
    last: NaiveDate,
    timezone: &Z,
) -> Result<(DateTime<Z>, DateTime<Z>), Error> {
    let end = last
        .and_hms_milli_opt(23, 59, 59, 999)
        .ok_or_else(|| Error::usage(format!("Date {last} is out of range")))?;

    Ok((
        window_bound(timezone, first.and_time(Default::default()))?,
        window_bound(timezone, end)?,
    ))
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, NaiveDate, SecondsFormat, TimeZone, Utc};
    use chrono_tz::America::Santiago;
    use chrono_tz::Europe::Berlin;
    use chrono_tz::Tz;
    use rstest::rstest;

    use super::mock_datetime;
    use super::{
        day_window, from_iso_timestamp, localize, month_window, now_in, to_iso_timestamp,
        year_window,
    };

    /// 時計を止めていない場合は現在時刻を返す。
    #[test]
    fn test_now_without_frozen_clock() {
        let before = Utc::now();
        let now = mock_datetime::now();

        assert!(now >= before);
        assert!(now - before < chrono::Duration::seconds(5));
    }

    /// 止めた時刻をユーザーのタイムゾーンで取得でき、ガードをdropすると元に戻る。
    #[test]
    fn test_now_in_with_frozen_clock() {
        let frozen = Berlin.with_ymd_and_hms(2024, 3, 1, 9, 30, 0).unwrap();
        {
            let _clock = mock_datetime::freeze_at(frozen);

            assert_eq!(now_in(&Berlin), frozen);
            assert_eq!(
                now_in(&Santiago).to_rfc3339_opts(SecondsFormat::Secs, true),
                "2024-03-01T05:30:00-03:00"
            );
        }

        assert!(Utc::now() - mock_datetime::now() < chrono::Duration::seconds(5));
    }

    /// UTC以外のタイムゾーンでも`Z`付きのUTCで出力されることを確認する。
    #[rstest]
    #[case::utc(Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap().with_timezone(&Berlin), "2024-03-01T09:00:00Z")]
    #[case::winter(Berlin.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap(), "2024-03-01T08:00:00Z")]
    #[case::summer(Berlin.with_ymd_and_hms(2024, 7, 1, 9, 0, 0).unwrap(), "2024-07-01T07:00:00Z")]
    fn test_to_iso_timestamp(#[case] input: DateTime<Tz>, #[case] expected: &str) {
        assert_eq!(to_iso_timestamp(&input), expected);
    }

    #[test]
    fn test_to_iso_timestamp_keeps_milliseconds() {
        let input = Utc.with_ymd_and_hms(2024, 2, 29, 23, 59, 59).unwrap()
            + chrono::Duration::milliseconds(999);

        assert_eq!(to_iso_timestamp(&input), "2024-02-29T23:59:59.999Z");
    }

    #[rstest]
    #[case::zulu("2024-03-01T08:00:00Z")]
    #[case::offset("2024-03-01T10:00:00+02:00")]
    #[case::no_suffix("2024-03-01T08:00:00")]
    fn test_from_iso_timestamp(#[case] input: &str) {
        let parsed = from_iso_timestamp(input, &Berlin).unwrap();

        assert_eq!(parsed, Berlin.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap());
        assert_eq!(parsed.timezone(), Berlin);
    }

    #[test]
    fn test_from_iso_timestamp_invalid() {
        assert!(from_iso_timestamp("yesterday", &Berlin).is_err());
    }

    /// 送信した時刻を受信し直しても秒単位で一致することを確認する。
    #[rstest]
    #[case(Berlin.with_ymd_and_hms(2024, 3, 31, 1, 59, 0).unwrap())]
    #[case(Berlin.with_ymd_and_hms(2024, 3, 31, 3, 0, 0).unwrap())]
    #[case(Berlin.with_ymd_and_hms(2024, 10, 27, 2, 30, 15).earliest().unwrap())]
    fn test_round_trip(#[case] input: DateTime<Tz>) {
        let wire = to_iso_timestamp(&input);

        assert_eq!(from_iso_timestamp(&wire, &Berlin).unwrap(), input);
    }

    #[test]
    fn test_localize_nonexistent_time() {
        let naive = NaiveDate::from_ymd_opt(2024, 3, 31)
            .unwrap()
            .and_hms_opt(2, 30, 0)
            .unwrap();

        assert!(localize(&Berlin, naive).is_err());
    }

    #[test]
    fn test_day_window() {
        let (start, end) = day_window(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(), &Berlin).unwrap();

        assert_eq!(to_iso_timestamp(&start), "2024-02-29T23:00:00Z");
        assert_eq!(to_iso_timestamp(&end), "2024-03-01T23:00:00Z");
    }

    #[rstest]
    #[case::leap_february(2024, 2, "2024-02-29T22:59:59.999Z")]
    #[case::february(2023, 2, "2023-02-28T22:59:59.999Z")]
    #[case::december(2023, 12, "2023-12-31T22:59:59.999Z")]
    fn test_month_window(#[case] year: i32, #[case] month: u32, #[case] expected_end: &str) {
        let (start, end) = month_window(year, month, &Berlin).unwrap();

        assert_eq!(start, Berlin.with_ymd_and_hms(year, month, 1, 0, 0, 0).unwrap());
        assert_eq!(to_iso_timestamp(&end), expected_end);
    }

    #[test]
    fn test_day_window_skipped_midnight() {
        // チリでは2024-09-08の0時がそのまま1時になる
        let (start, end) =
            day_window(NaiveDate::from_ymd_opt(2024, 9, 8).unwrap(), &Santiago).unwrap();

        assert_eq!(to_iso_timestamp(&start), "2024-09-08T04:00:00Z");
        assert_eq!(start.to_rfc3339(), "2024-09-08T01:00:00-03:00");
        assert_eq!(to_iso_timestamp(&end), "2024-09-09T03:00:00Z");
    }

    /// 入力された時刻は範囲の端と違い、存在しなければエラーのままにする。
    #[test]
    fn test_localize_skipped_midnight() {
        let naive = NaiveDate::from_ymd_opt(2024, 9, 8)
            .unwrap()
            .and_hms_opt(0, 30, 0)
            .unwrap();

        assert!(localize(&Santiago, naive).is_err());
    }

    #[test]
    fn test_month_window_invalid_month() {
        assert!(month_window(2024, 13, &Berlin).is_err());
    }

    #[test]
    fn test_year_window() {
        let (start, end) = year_window(2024, &Utc).unwrap();

        assert_eq!(to_iso_timestamp(&start), "2024-01-01T00:00:00Z");
        assert_eq!(to_iso_timestamp(&end), "2024-12-31T23:59:59.999Z");
    }
}
