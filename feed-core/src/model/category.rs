//! Instrument categories.
//!
//! Every classified packet belongs to exactly one [`Category`]. The category
//! fixes both the bus channel the packet travels on and the file it ends up in.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Topic carrying packets that could not be classified.
pub const DIAGNOSTIC_TOPIC: &str = "krx:unclassified";

/// The product family of a multicast channel.
///
/// The exchange separates futures, call options and put options onto distinct
/// multicast groups, so the kind is known from the channel a datagram arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedKind {
    Futures,
    Call,
    Put,
}

impl fmt::Display for FeedKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeedKind::Futures => write!(f, "futures"),
            FeedKind::Call => write!(f, "call"),
            FeedKind::Put => write!(f, "put"),
        }
    }
}

/// Whether the underlying of a contract is a single stock or an index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Listing {
    Stock,
    Index,
}

/// One of the six mutually exclusive instrument categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    FuturesStock,
    FuturesIndex,
    OptionsCallStock,
    OptionsCallIndex,
    OptionsPutStock,
    OptionsPutIndex,
}

impl Category {
    /// All categories, in channel order.
    pub const ALL: [Category; 6] = [
        Category::FuturesStock,
        Category::FuturesIndex,
        Category::OptionsCallStock,
        Category::OptionsCallIndex,
        Category::OptionsPutStock,
        Category::OptionsPutIndex,
    ];

    /// Maps a (feed kind, listing) pair to its category.
    ///
    /// This match is the complete routing table; adding a feed kind or a
    /// listing without a category fails to compile.
    pub fn from_parts(kind: FeedKind, listing: Listing) -> Self {
        match (kind, listing) {
            (FeedKind::Futures, Listing::Stock) => Category::FuturesStock,
            (FeedKind::Futures, Listing::Index) => Category::FuturesIndex,
            (FeedKind::Call, Listing::Stock) => Category::OptionsCallStock,
            (FeedKind::Call, Listing::Index) => Category::OptionsCallIndex,
            (FeedKind::Put, Listing::Stock) => Category::OptionsPutStock,
            (FeedKind::Put, Listing::Index) => Category::OptionsPutIndex,
        }
    }

    /// Position of the category in [`Category::ALL`]. Used to index counters.
    pub fn index(self) -> usize {
        match self {
            Category::FuturesStock => 0,
            Category::FuturesIndex => 1,
            Category::OptionsCallStock => 2,
            Category::OptionsCallIndex => 3,
            Category::OptionsPutStock => 4,
            Category::OptionsPutIndex => 5,
        }
    }

    /// The bus channel name.
    pub fn topic(self) -> &'static str {
        match self {
            Category::FuturesStock => "krx:futures:stock",
            Category::FuturesIndex => "krx:futures:index",
            Category::OptionsCallStock => "krx:options:call:stock",
            Category::OptionsCallIndex => "krx:options:call:index",
            Category::OptionsPutStock => "krx:options:put:stock",
            Category::OptionsPutIndex => "krx:options:put:index",
        }
    }

    /// File name inside a daily log directory.
    pub fn file_name(self) -> &'static str {
        match self {
            Category::FuturesStock => "futures_stock.log",
            Category::FuturesIndex => "futures_index.log",
            Category::OptionsCallStock => "options_call_stock.log",
            Category::OptionsCallIndex => "options_call_index.log",
            Category::OptionsPutStock => "options_put_stock.log",
            Category::OptionsPutIndex => "options_put_index.log",
        }
    }

    /// Compact label for status lines.
    pub fn short_label(self) -> &'static str {
        match self {
            Category::FuturesStock => "fut-stk",
            Category::FuturesIndex => "fut-idx",
            Category::OptionsCallStock => "call-stk",
            Category::OptionsCallIndex => "call-idx",
            Category::OptionsPutStock => "put-stk",
            Category::OptionsPutIndex => "put-idx",
        }
    }

    /// Resolves a bus topic back to its category.
    pub fn from_topic(topic: &str) -> Option<Self> {
        Category::ALL.into_iter().find(|c| c.topic() == topic)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.topic())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::from_topic(s).ok_or_else(|| format!("Unknown category topic: {}", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_routing_table_is_a_bijection() {
        let kinds = [FeedKind::Futures, FeedKind::Call, FeedKind::Put];
        let listings = [Listing::Stock, Listing::Index];

        let mut seen = HashSet::new();
        for kind in kinds {
            for listing in listings {
                assert!(seen.insert(Category::from_parts(kind, listing)));
            }
        }
        assert_eq!(seen.len(), Category::ALL.len());
    }

    #[test]
    fn test_topics_and_files_are_unique() {
        let topics: HashSet<_> = Category::ALL.iter().map(|c| c.topic()).collect();
        let files: HashSet<_> = Category::ALL.iter().map(|c| c.file_name()).collect();
        assert_eq!(topics.len(), 6);
        assert_eq!(files.len(), 6);
        assert!(!topics.contains(DIAGNOSTIC_TOPIC));
    }

    #[test]
    fn test_no_topic_is_a_prefix_of_another() {
        // SUB sockets filter by prefix, so a prefix overlap would leak one
        // category into another's subscriber.
        let mut topics: Vec<&str> = Category::ALL.iter().map(|c| c.topic()).collect();
        topics.push(DIAGNOSTIC_TOPIC);
        for a in &topics {
            for b in &topics {
                if a != b {
                    assert!(!b.starts_with(a), "{} is a prefix of {}", a, b);
                }
            }
        }
    }

    #[test]
    fn test_topic_round_trip_and_index() {
        for (i, category) in Category::ALL.into_iter().enumerate() {
            assert_eq!(category.index(), i);
            assert_eq!(category.topic().parse::<Category>(), Ok(category));
        }
        assert!(Category::from_topic("krx:futures").is_none());
    }
}
