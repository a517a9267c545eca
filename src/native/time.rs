//! Implements wrappers for the Windows time structures found in event payloads.

/// Wrapper for [FILETIME](https://learn.microsoft.com/en-us/windows/win32/api/minwinbase/ns-minwinbase-filetime)
///
/// A count of 100-nanosecond intervals since January 1, 1601 (UTC).
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FileTime(i64);

const SECONDS_BETWEEN_1601_AND_1970: i64 = 11_644_473_600;
const NS_IN_SECOND: i64 = 1_000_000_000;
const MS_IN_SECOND: i64 = 1_000;
const INTERVALS_IN_MS: i64 = 10_000;

impl FileTime {
    pub const SIZE: usize = 8;

    /// Converts to a unix timestamp with millisecond granularity.
    pub fn as_unix_timestamp(&self) -> i64 {
        self.0.div_euclid(INTERVALS_IN_MS) - (SECONDS_BETWEEN_1601_AND_1970 * MS_IN_SECOND)
    }

    /// Converts to a unix timestamp with nanosecond granularity.
    pub fn as_unix_timestamp_nanos(&self) -> i128 {
        self.0 as i128 * 100 - (SECONDS_BETWEEN_1601_AND_1970 as i128 * NS_IN_SECOND as i128)
    }

    /// Converts to OffsetDateTime
    ///
    /// Returns `None` for values outside of the range `time` can represent.
    #[cfg(feature = "time_rs")]
    pub fn as_date_time(&self) -> Option<time::OffsetDateTime> {
        time::OffsetDateTime::from_unix_timestamp_nanos(self.as_unix_timestamp_nanos()).ok()
    }

    /// The raw 100ns interval count
    pub fn as_quad(&self) -> i64 {
        self.0
    }

    pub fn from_quad(quad: i64) -> Self {
        FileTime(quad)
    }

    /// `{dwLowDateTime: u32, dwHighDateTime: u32}`, little-endian
    pub fn from_bytes(bytes: &[u8; Self::SIZE]) -> Self {
        let low = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as u64;
        let high = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]) as u64;
        FileTime(((high << 32) | low) as i64)
    }
}

#[cfg(feature = "time_rs")]
impl TryFrom<FileTime> for time::OffsetDateTime {
    type Error = time::error::ComponentRange;

    fn try_from(file_time: FileTime) -> Result<Self, Self::Error> {
        time::OffsetDateTime::from_unix_timestamp_nanos(file_time.as_unix_timestamp_nanos())
    }
}

#[cfg(feature = "serde")]
impl serde::ser::Serialize for FileTime {
    #[cfg(feature = "time_rs")]
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.as_date_time().serialize(serializer)
    }

    #[cfg(not(feature = "time_rs"))]
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.as_unix_timestamp().serialize(serializer)
    }
}

/// Wrapper for [SYSTEMTIME](https://learn.microsoft.com/en-us/windows/win32/api/minwinbase/ns-minwinbase-systemtime)
///
/// Fields are kept as found in the payload. Conversions return `None` when they do not describe
/// a valid date, the way `SystemTimeToFileTime` fails on them.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash)]
pub struct SystemTime {
    pub year: u16,
    pub month: u16,
    pub day_of_week: u16,
    pub day: u16,
    pub hour: u16,
    pub minute: u16,
    pub second: u16,
    pub milliseconds: u16,
}

impl SystemTime {
    pub const SIZE: usize = 16;

    pub fn from_bytes(bytes: &[u8; Self::SIZE]) -> Self {
        let word = |i: usize| u16::from_le_bytes([bytes[2 * i], bytes[2 * i + 1]]);
        SystemTime {
            year: word(0),
            month: word(1),
            day_of_week: word(2),
            day: word(3),
            hour: word(4),
            minute: word(5),
            second: word(6),
            milliseconds: word(7),
        }
    }

    /// Equivalent of `SystemTimeToFileTime`. `day_of_week` is ignored.
    pub fn to_file_time(&self) -> Option<FileTime> {
        if !(1601..=30827).contains(&self.year) {
            return None;
        }
        let month = time::Month::try_from(u8::try_from(self.month).ok()?).ok()?;
        let date =
            time::Date::from_calendar_date(i32::from(self.year), month, u8::try_from(self.day).ok()?)
                .ok()?;
        let time_of_day = time::Time::from_hms_milli(
            u8::try_from(self.hour).ok()?,
            u8::try_from(self.minute).ok()?,
            u8::try_from(self.second).ok()?,
            self.milliseconds,
        )
        .ok()?;
        let date_time = time::PrimitiveDateTime::new(date, time_of_day).assume_utc();

        let ms = (date_time.unix_timestamp() + SECONDS_BETWEEN_1601_AND_1970) * MS_IN_SECOND
            + i64::from(date_time.millisecond());
        Some(FileTime(ms * INTERVALS_IN_MS))
    }

    /// Converts to a unix timestamp with millisecond granularity.
    pub fn as_unix_timestamp(&self) -> Option<i64> {
        self.to_file_time().map(|ft| ft.as_unix_timestamp())
    }

    /// Converts to a unix timestamp with nanosecond granularity.
    pub fn as_unix_timestamp_nanos(&self) -> Option<i128> {
        self.to_file_time().map(|ft| ft.as_unix_timestamp_nanos())
    }

    /// Converts to OffsetDateTime
    #[cfg(feature = "time_rs")]
    pub fn as_date_time(&self) -> Option<time::OffsetDateTime> {
        self.to_file_time().and_then(|ft| ft.as_date_time())
    }
}

#[cfg(feature = "serde")]
impl serde::ser::Serialize for SystemTime {
    #[cfg(feature = "time_rs")]
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.as_date_time().serialize(serializer)
    }

    #[cfg(not(feature = "time_rs"))]
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.as_unix_timestamp().serialize(serializer)
    }
}
