//! Twitter API v1.1 types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::params::FilterLevel;

// ─────────────────────────────────────────────────────────────────────────────
// Geo Types
// ─────────────────────────────────────────────────────────────────────────────

/// A point, in GeoJSON order: longitude first.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 2]", into = "[f64; 2]")]
pub struct Coordinate {
    pub longitude: f64,
    pub latitude: f64,
}

impl Coordinate {
    #[must_use]
    pub const fn new(longitude: f64, latitude: f64) -> Self {
        Self {
            longitude,
            latitude,
        }
    }
}

impl From<[f64; 2]> for Coordinate {
    fn from([longitude, latitude]: [f64; 2]) -> Self {
        Self::new(longitude, latitude)
    }
}

impl From<Coordinate> for [f64; 2] {
    fn from(c: Coordinate) -> Self {
        [c.longitude, c.latitude]
    }
}

/// An axis-aligned box given by its south-west and north-east corners.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub southwest: Coordinate,
    pub northeast: Coordinate,
}

impl BoundingBox {
    #[must_use]
    pub const fn new(southwest: Coordinate, northeast: Coordinate) -> Self {
        Self {
            southwest,
            northeast,
        }
    }

    /// SW longitude, SW latitude, NE longitude, NE latitude.
    #[must_use]
    pub const fn to_lon_lat_quad(&self) -> [f64; 4] {
        [
            self.southwest.longitude,
            self.southwest.latitude,
            self.northeast.longitude,
            self.northeast.latitude,
        ]
    }
}

/// GeoJSON point attached to a status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    /// Always "Point"
    #[serde(rename = "type", default, deserialize_with = "null_as_default")]
    pub kind: String,

    pub coordinates: Coordinate,
}

/// Polygon outlining a place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaceBounds {
    /// Usually "Polygon"
    #[serde(rename = "type", default, deserialize_with = "null_as_default")]
    pub kind: String,

    #[serde(default, deserialize_with = "null_as_default")]
    pub coordinates: Vec<Vec<Coordinate>>,
}

/// A named place a status is associated with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Place {
    /// Place ID
    pub id: String,

    /// API URL for the place
    #[serde(default)]
    pub url: Option<String>,

    /// Place type, e.g. "city", "poi"
    #[serde(default)]
    pub place_type: Option<String>,

    /// Short name
    #[serde(default)]
    pub name: Option<String>,

    /// Full human-readable name
    #[serde(default)]
    pub full_name: Option<String>,

    /// ISO country code
    #[serde(default)]
    pub country_code: Option<String>,

    /// Country name
    #[serde(default)]
    pub country: Option<String>,

    #[serde(default)]
    pub bounding_box: Option<PlaceBounds>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Entity Types
// ─────────────────────────────────────────────────────────────────────────────

/// Entities parsed out of status text.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Entities {
    #[serde(default, deserialize_with = "null_as_default")]
    pub hashtags: Vec<HashtagEntity>,

    #[serde(default, deserialize_with = "null_as_default")]
    pub symbols: Vec<HashtagEntity>,

    #[serde(default, deserialize_with = "null_as_default")]
    pub user_mentions: Vec<MentionEntity>,

    #[serde(default, deserialize_with = "null_as_default")]
    pub urls: Vec<UrlEntity>,

    #[serde(default, deserialize_with = "null_as_default")]
    pub media: Vec<MediaEntity>,
}

/// Hashtag or cashtag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashtagEntity {
    /// Text without the leading `#` or `$`
    pub text: String,

    /// Start and end offsets in the status text
    #[serde(default, deserialize_with = "null_as_default")]
    pub indices: Vec<u32>,
}

/// @-mention of a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MentionEntity {
    #[serde(default)]
    pub id: Option<u64>,

    pub screen_name: String,

    #[serde(default)]
    pub name: Option<String>,

    #[serde(default, deserialize_with = "null_as_default")]
    pub indices: Vec<u32>,
}

/// Link in the status text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlEntity {
    /// t.co URL as it appears in the text
    pub url: String,

    #[serde(default)]
    pub expanded_url: Option<String>,

    #[serde(default)]
    pub display_url: Option<String>,

    #[serde(default, deserialize_with = "null_as_default")]
    pub indices: Vec<u32>,
}

/// Attached photo, video or GIF.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaEntity {
    pub id: u64,

    /// "photo", "video" or "animated_gif"
    #[serde(rename = "type", default)]
    pub kind: Option<String>,

    #[serde(default)]
    pub media_url_https: Option<String>,

    #[serde(default)]
    pub url: Option<String>,

    #[serde(default)]
    pub display_url: Option<String>,

    #[serde(default)]
    pub expanded_url: Option<String>,

    #[serde(default, deserialize_with = "null_as_default")]
    pub indices: Vec<u32>,
}

// ─────────────────────────────────────────────────────────────────────────────
// User Types
// ─────────────────────────────────────────────────────────────────────────────

/// Twitter user object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    /// User ID
    pub id: u64,

    /// Display name
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,

    /// Handle without @
    #[serde(default, deserialize_with = "null_as_default")]
    pub screen_name: String,

    /// User bio
    #[serde(default)]
    pub description: Option<String>,

    /// User location
    #[serde(default)]
    pub location: Option<String>,

    /// User URL
    #[serde(default)]
    pub url: Option<String>,

    /// Profile image URL
    #[serde(default)]
    pub profile_image_url_https: Option<String>,

    /// Whether the account is protected (private)
    #[serde(default, deserialize_with = "null_as_default")]
    pub protected: bool,

    /// Whether the account is verified
    #[serde(default, deserialize_with = "null_as_default")]
    pub verified: bool,

    #[serde(default)]
    pub followers_count: Option<u64>,

    #[serde(default)]
    pub friends_count: Option<u64>,

    #[serde(default)]
    pub statuses_count: Option<u64>,

    /// Account creation timestamp
    #[serde(default, with = "twitter_date")]
    pub created_at: Option<DateTime<Utc>>,
}

/// Co-author of a status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contributor {
    pub id: u64,

    #[serde(default)]
    pub screen_name: Option<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Status Types
// ─────────────────────────────────────────────────────────────────────────────

/// Search metadata attached to statuses returned by search.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    #[serde(default)]
    pub iso_language_code: Option<String>,

    /// "recent" or "popular"
    #[serde(default)]
    pub result_type: Option<String>,
}

/// Untruncated content of a long status.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtendedTweet {
    #[serde(default)]
    pub full_text: Option<String>,

    #[serde(default)]
    pub entities: Option<Entities>,

    #[serde(default)]
    pub extended_entities: Option<Entities>,
}

/// A tweet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Status {
    /// Status ID
    pub id: u64,

    /// Creation timestamp
    #[serde(default, with = "twitter_date")]
    pub created_at: Option<DateTime<Utc>>,

    /// Text, possibly truncated
    #[serde(default)]
    pub text: Option<String>,

    /// Text in extended mode
    #[serde(default)]
    pub full_text: Option<String>,

    /// Untruncated content in compatibility mode
    #[serde(default)]
    pub extended_tweet: Option<ExtendedTweet>,

    /// Author
    #[serde(default)]
    pub user: Option<User>,

    /// Exact location
    #[serde(default)]
    pub coordinates: Option<Coordinates>,

    /// Associated place
    #[serde(default)]
    pub place: Option<Place>,

    #[serde(default)]
    pub quoted_status_id: Option<u64>,

    /// Quoted status, decoded recursively
    #[serde(default)]
    pub quoted_status: Option<Box<Status>>,

    /// Original of a retweet, decoded recursively
    #[serde(default)]
    pub retweeted_status: Option<Box<Status>>,

    #[serde(default, deserialize_with = "null_as_default")]
    pub entities: Entities,

    #[serde(default)]
    pub extended_entities: Option<Entities>,

    #[serde(default)]
    pub favorite_count: Option<u64>,

    #[serde(default)]
    pub retweet_count: Option<u64>,

    #[serde(default)]
    pub quote_count: Option<u64>,

    #[serde(default)]
    pub reply_count: Option<u64>,

    #[serde(default, deserialize_with = "null_as_default")]
    pub truncated: bool,

    #[serde(default)]
    pub possibly_sensitive: Option<bool>,

    #[serde(default, deserialize_with = "null_as_default")]
    pub favorited: bool,

    #[serde(default, deserialize_with = "null_as_default")]
    pub retweeted: bool,

    #[serde(default, deserialize_with = "null_as_default")]
    pub is_quote_status: bool,

    #[serde(default)]
    pub in_reply_to_status_id: Option<u64>,

    #[serde(default)]
    pub in_reply_to_user_id: Option<u64>,

    #[serde(default)]
    pub in_reply_to_screen_name: Option<String>,

    /// Language of the text (BCP 47), "und" when unknown
    #[serde(default)]
    pub lang: Option<String>,

    /// Posting client, as an HTML anchor
    #[serde(default)]
    pub source: Option<String>,

    /// `None` when absent or not a level this crate knows
    #[serde(default, deserialize_with = "lenient_filter_level")]
    pub filter_level: Option<FilterLevel>,

    /// Milliseconds since the epoch, streaming only
    #[serde(default, with = "lenient_u64")]
    pub timestamp_ms: Option<u64>,

    /// Present on search results
    #[serde(default)]
    pub metadata: Option<Metadata>,

    #[serde(default)]
    pub contributors: Option<Vec<Contributor>>,
}

impl Status {
    /// The most complete text available.
    #[must_use]
    pub fn display_text(&self) -> Option<&str> {
        self.extended_tweet
            .as_ref()
            .and_then(|e| e.full_text.as_deref())
            .or(self.full_text.as_deref())
            .or(self.text.as_deref())
    }

    /// Whether this status is a retweet.
    #[must_use]
    pub const fn is_retweet(&self) -> bool {
        self.retweeted_status.is_some()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Stream Notices
// ─────────────────────────────────────────────────────────────────────────────

/// A status was deleted and should be removed from any store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletionNotice {
    pub id: u64,
    pub user_id: u64,
}

/// More statuses matched than the stream was allowed to deliver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitNotice {
    /// Undelivered statuses since the connection was opened
    pub track: u64,

    #[serde(default, with = "lenient_u64")]
    pub timestamp_ms: Option<u64>,
}

/// The client is falling behind, or went quiet for too long.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarningNotice {
    pub code: String,

    #[serde(default, deserialize_with = "null_as_default")]
    pub message: String,

    /// How full the server-side queue is
    #[serde(default)]
    pub percent_full: Option<u8>,

    #[serde(default)]
    pub user_id: Option<u64>,
}

impl WarningNotice {
    /// Code of the locally generated stall warning.
    pub const STALL: &'static str = "STALL";

    /// Warning emitted when nothing arrived within `timeout`.
    #[must_use]
    pub fn stall(timeout: std::time::Duration) -> Self {
        Self {
            code: Self::STALL.to_string(),
            message: format!("no data received for {}s, reconnecting", timeout.as_secs()),
            percent_full: None,
            user_id: None,
        }
    }
}

/// The server is about to close the connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisconnectNotice {
    pub code: u32,

    #[serde(default)]
    pub stream_name: Option<String>,

    #[serde(default, deserialize_with = "null_as_default")]
    pub reason: String,
}

/// A message that could not be understood.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseError {
    pub message: String,

    /// The offending message, lossily decoded
    pub raw: String,
}

/// One decoded message from a stream.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum StreamEvent {
    Status(Box<Status>),
    Deletion(DeletionNotice),
    Limit(LimitNotice),
    Warning(WarningNotice),
    Disconnect(DisconnectNotice),
    ParseError(ParseError),
}

impl StreamEvent {
    /// Short name of the variant, for logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Status(_) => "status",
            Self::Deletion(_) => "deletion",
            Self::Limit(_) => "limit",
            Self::Warning(_) => "warning",
            Self::Disconnect(_) => "disconnect",
            Self::ParseError(_) => "parse_error",
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// REST Types
// ─────────────────────────────────────────────────────────────────────────────

/// Response of `search/tweets`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    #[serde(default, deserialize_with = "null_as_default")]
    pub statuses: Vec<Status>,

    #[serde(default)]
    pub search_metadata: Option<SearchMetadata>,
}

/// Paging information of a search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchMetadata {
    #[serde(default)]
    pub query: Option<String>,

    #[serde(default)]
    pub count: Option<u32>,

    #[serde(default)]
    pub completed_in: Option<f64>,

    #[serde(default)]
    pub max_id: Option<u64>,

    #[serde(default)]
    pub since_id: Option<u64>,

    /// Query string for the next page
    #[serde(default)]
    pub next_results: Option<String>,

    #[serde(default)]
    pub refresh_url: Option<String>,
}

/// Response of `media/upload`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaUploadResponse {
    pub media_id: u64,

    #[serde(default)]
    pub media_id_string: Option<String>,

    #[serde(default)]
    pub size: Option<u64>,

    #[serde(default)]
    pub expires_after_secs: Option<u64>,

    #[serde(default)]
    pub image: Option<UploadedImage>,
}

impl MediaUploadResponse {
    /// ID as sent in `media_ids`.
    #[must_use]
    pub fn id_string(&self) -> String {
        self.media_id_string
            .clone()
            .unwrap_or_else(|| self.media_id.to_string())
    }
}

/// Image details of an uploaded media file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadedImage {
    #[serde(default)]
    pub image_type: Option<String>,

    #[serde(default)]
    pub w: Option<u32>,

    #[serde(default)]
    pub h: Option<u32>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Serde helpers
// ─────────────────────────────────────────────────────────────────────────────

/// Explicit `null` decodes like a missing field.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn lenient_filter_level<'de, D>(deserializer: D) -> Result<Option<FilterLevel>, D::Error>
where
    D: Deserializer<'de>,
{
    let level = Option::<String>::deserialize(deserializer)?;
    Ok(level.as_deref().and_then(FilterLevel::from_wire))
}

/// `Wed Aug 27 13:08:45 +0000 2008`
mod twitter_date {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer, de::Error as _};

    const FORMAT: &str = "%a %b %d %H:%M:%S %z %Y";

    #[allow(clippy::ref_option)]
    pub fn serialize<S>(date: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match date {
            Some(date) => serializer.collect_str(&date.format(FORMAT)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Option::<String>::deserialize(deserializer)?
            .map(|raw| {
                DateTime::parse_from_str(&raw, FORMAT)
                    .map(|date| date.with_timezone(&Utc))
                    .map_err(|e| D::Error::custom(format!("invalid date {raw:?}: {e}")))
            })
            .transpose()
    }
}

/// A `u64` that may arrive as a JSON number or a decimal string.
mod lenient_u64 {
    use serde::{Deserialize, Deserializer, Serialize, Serializer, de::Error as _};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(u64),
        Text(String),
    }

    #[allow(clippy::ref_option)]
    pub fn serialize<S>(value: &Option<u64>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        value.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Option::<Raw>::deserialize(deserializer)? {
            None => Ok(None),
            Some(Raw::Number(n)) => Ok(Some(n)),
            Some(Raw::Text(s)) => s
                .trim()
                .parse()
                .map(Some)
                .map_err(|e| D::Error::custom(format!("invalid number {s:?}: {e}"))),
        }
    }
}
