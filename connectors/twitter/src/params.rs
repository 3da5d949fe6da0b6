//! Streaming request parameters.
//!
//! Each parameter set serializes only what was explicitly set. Richer sets
//! wrap the one below them and append their own fields:
//!
//! ```text
//! StreamingParameters
//!   └─ BaseFilterParameters   (track, locations)
//!        ├─ FilterParameters  (follow)
//!        └─ UserParameters    (replies, with)
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::BoundingBox;

/// Ordered wire parameters.
pub type Parameters = BTreeMap<String, String>;

/// Serialization of a parameter set into wire key/value pairs.
pub trait ToParameters {
    /// Fields that were explicitly set, keyed by their wire name.
    fn to_parameters(&self) -> Parameters;
}

// ─────────────────────────────────────────────────────────────────────────────
// Enumerations
// ─────────────────────────────────────────────────────────────────────────────

/// Minimum `filter_level` a status must carry to be streamed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterLevel {
    None,
    Low,
    Medium,
}

impl FilterLevel {
    /// Wire value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Low => "low",
            Self::Medium => "medium",
        }
    }

    /// Parse a wire value; anything unrecognised is `None`.
    #[must_use]
    pub fn from_wire(value: &str) -> Option<Self> {
        match value {
            "none" => Some(Self::None),
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            _ => None,
        }
    }
}

/// Message delimiting requested from the server.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Delimited {
    /// Newline separated messages.
    #[default]
    None,
    /// Each message preceded by its byte length.
    Length,
}

impl Delimited {
    /// Wire value, if this mode is expressed on the wire at all.
    #[must_use]
    pub const fn as_param(self) -> Option<&'static str> {
        match self {
            Self::None => None,
            Self::Length => Some("length"),
        }
    }
}

/// Which accounts' messages a user stream includes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum With {
    /// Only the authenticated user.
    Users,
    /// The user and the accounts they follow.
    Followings,
}

impl With {
    /// Wire value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Users => "users",
            Self::Followings => "followings",
        }
    }
}

fn set_joined<T: ToString>(parameters: &mut Parameters, key: &str, values: &[T]) {
    if !values.is_empty() {
        let joined = values
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(",");
        parameters.insert(key.to_string(), joined);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Streaming parameters
// ─────────────────────────────────────────────────────────────────────────────

/// Parameters common to every streaming endpoint.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamingParameters {
    stall_warnings: Option<bool>,
    delimited: Option<Delimited>,
    filter_level: Option<FilterLevel>,
    languages: Vec<String>,
}

impl StreamingParameters {
    /// Create an empty parameter set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the server to send warnings when the client falls behind.
    #[must_use]
    pub const fn with_stall_warnings(mut self, enabled: bool) -> Self {
        self.stall_warnings = Some(enabled);
        self
    }

    /// Set message delimiting.
    #[must_use]
    pub const fn with_delimited(mut self, delimited: Delimited) -> Self {
        self.delimited = Some(delimited);
        self
    }

    /// Set the minimum filter level.
    #[must_use]
    pub const fn with_filter_level(mut self, level: FilterLevel) -> Self {
        self.filter_level = Some(level);
        self
    }

    /// Restrict to a single language.
    #[must_use]
    pub fn with_language(self, language: impl Into<String>) -> Self {
        self.with_languages([language])
    }

    /// Restrict to the given BCP 47 language codes.
    #[must_use]
    pub fn with_languages<I, S>(mut self, languages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.languages = languages.into_iter().map(Into::into).collect();
        self
    }

    /// Whether stall warnings were requested.
    #[must_use]
    pub fn stall_warnings(&self) -> bool {
        self.stall_warnings.unwrap_or(false)
    }

    /// Delimiting mode, `Delimited::None` when unset.
    #[must_use]
    pub fn delimited(&self) -> Delimited {
        self.delimited.unwrap_or_default()
    }

    /// Filter level, if set.
    #[must_use]
    pub const fn filter_level(&self) -> Option<FilterLevel> {
        self.filter_level
    }

    /// Language codes.
    #[must_use]
    pub fn languages(&self) -> &[String] {
        &self.languages
    }
}

impl ToParameters for StreamingParameters {
    fn to_parameters(&self) -> Parameters {
        let mut parameters = Parameters::new();

        if let Some(enabled) = self.stall_warnings {
            parameters.insert("stall_warnings".into(), enabled.to_string());
        }

        if let Some(value) = self.delimited.and_then(Delimited::as_param) {
            parameters.insert("delimited".into(), value.into());
        }

        if let Some(level) = self.filter_level {
            parameters.insert("filter_level".into(), level.as_str().into());
        }

        set_joined(&mut parameters, "language", &self.languages);

        parameters
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Filter parameters
// ─────────────────────────────────────────────────────────────────────────────

/// Keyword and location filters shared by filter and user streams.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BaseFilterParameters {
    stream: StreamingParameters,
    tracks: Vec<String>,
    locations: Vec<BoundingBox>,
}

impl BaseFilterParameters {
    /// Create an empty parameter set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap existing streaming parameters.
    #[must_use]
    pub fn from_streaming(stream: StreamingParameters) -> Self {
        Self {
            stream,
            ..Self::default()
        }
    }

    /// Track a single phrase.
    #[must_use]
    pub fn with_track(self, track: impl Into<String>) -> Self {
        self.with_tracks([track])
    }

    /// Track the given phrases.
    #[must_use]
    pub fn with_tracks<I, S>(mut self, tracks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tracks = tracks.into_iter().map(Into::into).collect();
        self
    }

    /// Filter by a single bounding box.
    #[must_use]
    pub fn with_location(self, location: BoundingBox) -> Self {
        self.with_locations([location])
    }

    /// Filter by the given bounding boxes.
    #[must_use]
    pub fn with_locations(mut self, locations: impl IntoIterator<Item = BoundingBox>) -> Self {
        self.locations = locations.into_iter().collect();
        self
    }

    /// Replace the streaming parameters.
    #[must_use]
    pub fn with_streaming(mut self, stream: StreamingParameters) -> Self {
        self.stream = stream;
        self
    }

    /// Underlying streaming parameters.
    #[must_use]
    pub const fn streaming(&self) -> &StreamingParameters {
        &self.stream
    }

    /// Tracked phrases.
    #[must_use]
    pub fn tracks(&self) -> &[String] {
        &self.tracks
    }

    /// Bounding boxes.
    #[must_use]
    pub fn locations(&self) -> &[BoundingBox] {
        &self.locations
    }
}

impl ToParameters for BaseFilterParameters {
    fn to_parameters(&self) -> Parameters {
        let mut parameters = self.stream.to_parameters();

        set_joined(&mut parameters, "track", &self.tracks);

        let corners: Vec<f64> = self
            .locations
            .iter()
            .flat_map(BoundingBox::to_lon_lat_quad)
            .collect();
        set_joined(&mut parameters, "locations", &corners);

        parameters
    }
}

/// Parameters for the filter stream.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterParameters {
    filter: BaseFilterParameters,
    follows: Vec<String>,
}

impl FilterParameters {
    /// Create an empty parameter set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap existing base filter parameters.
    #[must_use]
    pub fn from_filter(filter: BaseFilterParameters) -> Self {
        Self {
            filter,
            follows: Vec::new(),
        }
    }

    /// Follow a single user id.
    #[must_use]
    pub fn with_follow(self, user_id: impl Into<String>) -> Self {
        self.with_follows([user_id])
    }

    /// Follow the given user ids.
    #[must_use]
    pub fn with_follows<I, S>(mut self, user_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.follows = user_ids.into_iter().map(Into::into).collect();
        self
    }

    /// Underlying filter parameters.
    #[must_use]
    pub const fn filter(&self) -> &BaseFilterParameters {
        &self.filter
    }

    /// Followed user ids.
    #[must_use]
    pub fn follows(&self) -> &[String] {
        &self.follows
    }

    /// Whether any predicate the filter endpoint requires was set.
    #[must_use]
    pub fn has_predicate(&self) -> bool {
        !(self.follows.is_empty()
            && self.filter.tracks.is_empty()
            && self.filter.locations.is_empty())
    }
}

impl ToParameters for FilterParameters {
    fn to_parameters(&self) -> Parameters {
        let mut parameters = self.filter.to_parameters();
        set_joined(&mut parameters, "follow", &self.follows);
        parameters
    }
}

/// Parameters for the user stream.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserParameters {
    filter: BaseFilterParameters,
    replies: bool,
    with: Option<With>,
}

impl UserParameters {
    /// Create an empty parameter set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap existing base filter parameters.
    #[must_use]
    pub fn from_filter(filter: BaseFilterParameters) -> Self {
        Self {
            filter,
            ..Self::default()
        }
    }

    /// Include all replies (`replies=all`).
    #[must_use]
    pub const fn with_replies(mut self, replies: bool) -> Self {
        self.replies = replies;
        self
    }

    /// Set the `with` scope.
    #[must_use]
    pub const fn with_scope(mut self, with: With) -> Self {
        self.with = Some(with);
        self
    }

    /// Underlying filter parameters.
    #[must_use]
    pub const fn filter(&self) -> &BaseFilterParameters {
        &self.filter
    }
}

impl ToParameters for UserParameters {
    fn to_parameters(&self) -> Parameters {
        let mut parameters = self.filter.to_parameters();

        if self.replies {
            parameters.insert("replies".into(), "all".into());
        }

        if let Some(with) = self.with {
            parameters.insert("with".into(), with.as_str().into());
        }

        parameters
    }
}
