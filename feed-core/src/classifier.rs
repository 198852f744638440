//! Packet classification.
//!
//! A packet is routed using the feed kind of the channel it arrived on and two
//! fields of the exchange's fixed header:
//!
//! | bytes    | field   |
//! |----------|---------|
//! | `0..5`   | TR code |
//! | `17..29` | ISIN    |
//!
//! The first six ISIN characters (the issue prefix) tell single-stock
//! contracts apart from index contracts. Anything that does not match these
//! rules is reported as [`Classification::Unclassified`], never guessed.

use crate::config::{ClassifierConfig, ConfigError};
use crate::model::{Category, FeedKind, Listing};
use std::collections::HashSet;
use std::ops::Range;
use std::path::Path;

pub const TR_CODE_RANGE: Range<usize> = 0..5;
pub const ISIN_RANGE: Range<usize> = 17..29;
pub const PREFIX_LEN: usize = 6;
/// Shortest packet that carries a complete ISIN.
pub const MIN_PACKET_LEN: usize = ISIN_RANGE.end;

/// Quote (B6xx) and trade (A3xx) messages.
pub const DEFAULT_TR_CODES: [&str; 18] = [
    "B604F", "B605F", "A301F", "A302F", "A303F", "A304F", "A305F", "A306F", "A307F", "A308F",
    "A309F", "A310F", "A311F", "A312F", "A313F", "A315F", "A316F", "A317F",
];

pub type TrCode = [u8; 5];
pub type IssuePrefix = [u8; PREFIX_LEN];

/// Why a packet could not be classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnclassifiedReason {
    /// Too short to hold the header fields.
    Truncated,
    /// The TR code is not one of the configured message types.
    UnknownTrCode,
    /// The ISIN field is not ASCII alphanumeric.
    MalformedIsin,
}

impl UnclassifiedReason {
    pub const ALL: [UnclassifiedReason; 3] = [
        UnclassifiedReason::Truncated,
        UnclassifiedReason::UnknownTrCode,
        UnclassifiedReason::MalformedIsin,
    ];

    pub fn index(self) -> usize {
        match self {
            UnclassifiedReason::Truncated => 0,
            UnclassifiedReason::UnknownTrCode => 1,
            UnclassifiedReason::MalformedIsin => 2,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            UnclassifiedReason::Truncated => "truncated",
            UnclassifiedReason::UnknownTrCode => "unknown_tr_code",
            UnclassifiedReason::MalformedIsin => "malformed_isin",
        }
    }
}

/// The classifier's verdict for one packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Classified(Category),
    Unclassified(UnclassifiedReason),
}

impl Classification {
    pub fn category(self) -> Option<Category> {
        match self {
            Classification::Classified(category) => Some(category),
            Classification::Unclassified(_) => None,
        }
    }
}

/// Immutable classification tables.
#[derive(Debug, Clone, Default)]
pub struct Classifier {
    tr_codes: HashSet<TrCode>,
    stock_futures: HashSet<IssuePrefix>,
    stock_options: HashSet<IssuePrefix>,
}

impl Classifier {
    /// Creates a new Classifier.
    ///
    /// # Arguments
    ///
    /// * `tr_codes` - Message types to accept.
    /// * `stock_futures` - Issue prefixes of single-stock futures.
    /// * `stock_options` - Issue prefixes of single-stock options.
    pub fn new(
        tr_codes: impl IntoIterator<Item = TrCode>,
        stock_futures: impl IntoIterator<Item = IssuePrefix>,
        stock_options: impl IntoIterator<Item = IssuePrefix>,
    ) -> Self {
        Self {
            tr_codes: tr_codes.into_iter().collect(),
            stock_futures: stock_futures.into_iter().collect(),
            stock_options: stock_options.into_iter().collect(),
        }
    }

    /// Builds the tables from configuration, reading the prefix files if any.
    ///
    /// # Returns
    ///
    /// * `Ok(Classifier)` on success.
    /// * `Err` if a code or prefix is malformed or a prefix file cannot be read.
    pub fn from_config(config: &ClassifierConfig) -> Result<Self, ConfigError> {
        let tr_codes = config
            .tr_codes
            .iter()
            .map(|code| parse_tr_code(code))
            .collect::<Result<Vec<_>, _>>()?;

        let stock_futures = load_prefixes(
            &config.stock_futures_prefixes,
            config.stock_futures_prefix_file.as_deref(),
        )?;
        let stock_options = load_prefixes(
            &config.stock_options_prefixes,
            config.stock_options_prefix_file.as_deref(),
        )?;

        Ok(Self::new(tr_codes, stock_futures, stock_options))
    }

    pub fn tr_code_count(&self) -> usize {
        self.tr_codes.len()
    }

    pub fn stock_futures_count(&self) -> usize {
        self.stock_futures.len()
    }

    pub fn stock_options_count(&self) -> usize {
        self.stock_options.len()
    }

    /// Assigns a packet to a category.
    ///
    /// Only the fixed-size header is inspected, so the cost does not depend on
    /// the payload length.
    pub fn classify(&self, kind: FeedKind, payload: &[u8]) -> Classification {
        let Some(tr_code) = payload.get(TR_CODE_RANGE).and_then(|b| TrCode::try_from(b).ok())
        else {
            return Classification::Unclassified(UnclassifiedReason::Truncated);
        };
        if !self.tr_codes.contains(&tr_code) {
            return Classification::Unclassified(UnclassifiedReason::UnknownTrCode);
        }

        let Some(isin) = payload.get(ISIN_RANGE) else {
            return Classification::Unclassified(UnclassifiedReason::Truncated);
        };
        if !isin.iter().all(u8::is_ascii_alphanumeric) {
            return Classification::Unclassified(UnclassifiedReason::MalformedIsin);
        }

        let mut prefix: IssuePrefix = [0; PREFIX_LEN];
        prefix.copy_from_slice(&isin[..PREFIX_LEN]);

        Classification::Classified(Category::from_parts(kind, self.listing(kind, &prefix)))
    }

    fn listing(&self, kind: FeedKind, prefix: &IssuePrefix) -> Listing {
        let stock_prefixes = match kind {
            FeedKind::Futures => &self.stock_futures,
            FeedKind::Call | FeedKind::Put => &self.stock_options,
        };
        if stock_prefixes.contains(prefix) {
            Listing::Stock
        } else {
            Listing::Index
        }
    }
}

pub fn parse_tr_code(value: &str) -> Result<TrCode, ConfigError> {
    let bytes = value.as_bytes();
    if !value.is_ascii() || bytes.len() != TR_CODE_RANGE.len() {
        return Err(ConfigError::InvalidTrCode(value.to_string()));
    }
    let mut code: TrCode = [0; 5];
    code.copy_from_slice(bytes);
    Ok(code)
}

pub fn parse_prefix(value: &str) -> Result<IssuePrefix, ConfigError> {
    let bytes = value.as_bytes();
    if bytes.len() != PREFIX_LEN || !bytes.iter().all(u8::is_ascii_alphanumeric) {
        return Err(ConfigError::InvalidPrefix(value.to_string()));
    }
    let mut prefix: IssuePrefix = [0; PREFIX_LEN];
    prefix.copy_from_slice(bytes);
    Ok(prefix)
}

/// Inline prefixes followed by the ones listed in `file`, if any.
pub fn load_prefixes(inline: &[String], file: Option<&Path>) -> Result<Vec<IssuePrefix>, ConfigError> {
    let mut prefixes = inline
        .iter()
        .map(|v| parse_prefix(v))
        .collect::<Result<Vec<_>, _>>()?;
    if let Some(path) = file {
        prefixes.extend(read_prefix_file(path)?);
    }
    Ok(prefixes)
}

/// Reads one prefix per line. Blank lines and `#` comments are skipped.
pub fn read_prefix_file(path: &Path) -> Result<Vec<IssuePrefix>, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::PrefixFile {
        path: path.to_path_buf(),
        source,
    })?;

    content
        .lines()
        .map(|line| line.split('#').next().unwrap_or("").trim())
        .filter(|line| !line.is_empty())
        .map(parse_prefix)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const STOCK_FUTURE: &str = "KR4A24";
    const STOCK_OPTION: &str = "KR4B11";

    fn classifier() -> Classifier {
        Classifier::new(
            DEFAULT_TR_CODES.iter().map(|c| parse_tr_code(c).unwrap()),
            [parse_prefix(STOCK_FUTURE).unwrap()],
            [parse_prefix(STOCK_OPTION).unwrap()],
        )
    }

    /// TR code, 12 header bytes, ISIN, then a body.
    fn packet(tr_code: &str, isin: &str) -> Vec<u8> {
        let mut data = Vec::new();
        data.extend_from_slice(tr_code.as_bytes());
        data.extend_from_slice(b"000000000001");
        data.extend_from_slice(isin.as_bytes());
        data.extend_from_slice(b"0000123450000012340");
        data
    }

    #[test]
    fn test_all_six_categories() {
        let c = classifier();
        let cases = [
            (FeedKind::Futures, "KR4A24000001", Category::FuturesStock),
            (FeedKind::Futures, "KR4101V90009", Category::FuturesIndex),
            (FeedKind::Call, "KR4B11000001", Category::OptionsCallStock),
            (FeedKind::Call, "KR4201V92500", Category::OptionsCallIndex),
            (FeedKind::Put, "KR4B11000002", Category::OptionsPutStock),
            (FeedKind::Put, "KR4301V92500", Category::OptionsPutIndex),
        ];

        for (kind, isin, expected) in cases {
            assert_eq!(
                c.classify(kind, &packet("A301F", isin)),
                Classification::Classified(expected),
                "{} {}",
                kind,
                isin
            );
        }
    }

    #[test]
    fn test_prefix_sets_are_per_product() {
        // A stock futures prefix says nothing about options, and vice versa.
        let c = classifier();
        assert_eq!(
            c.classify(FeedKind::Call, &packet("B604F", "KR4A24000001")),
            Classification::Classified(Category::OptionsCallIndex)
        );
        assert_eq!(
            c.classify(FeedKind::Futures, &packet("B604F", "KR4B11000001")),
            Classification::Classified(Category::FuturesIndex)
        );
    }

    #[test]
    fn test_every_default_tr_code_is_accepted() {
        let c = classifier();
        for code in DEFAULT_TR_CODES {
            assert!(c
                .classify(FeedKind::Futures, &packet(code, "KR4101V90009"))
                .category()
                .is_some());
        }
    }

    #[test]
    fn test_short_packets_are_unclassified() {
        let c = classifier();
        for len in 0..MIN_PACKET_LEN {
            let data = &packet("A301F", "KR4A24000001")[..len];
            assert_eq!(
                c.classify(FeedKind::Futures, data),
                Classification::Unclassified(UnclassifiedReason::Truncated),
                "len {}",
                len
            );
        }
        // Exactly the header is enough.
        let data = &packet("A301F", "KR4A24000001")[..MIN_PACKET_LEN];
        assert_eq!(
            c.classify(FeedKind::Futures, data),
            Classification::Classified(Category::FuturesStock)
        );
    }

    #[test]
    fn test_unknown_tr_code() {
        let c = classifier();
        assert_eq!(
            c.classify(FeedKind::Futures, &packet("A399F", "KR4A24000001")),
            Classification::Unclassified(UnclassifiedReason::UnknownTrCode)
        );
        // A short packet with an unknown code is reported as the code mismatch.
        assert_eq!(
            c.classify(FeedKind::Futures, b"Z999X123"),
            Classification::Unclassified(UnclassifiedReason::UnknownTrCode)
        );
    }

    #[test]
    fn test_malformed_isin() {
        let c = classifier();
        assert_eq!(
            c.classify(FeedKind::Put, &packet("A301F", "KR4B11 00001")),
            Classification::Unclassified(UnclassifiedReason::MalformedIsin)
        );

        let mut data = packet("A301F", "KR4B11000001");
        data[20] = 0xFF;
        assert_eq!(
            c.classify(FeedKind::Put, &data),
            Classification::Unclassified(UnclassifiedReason::MalformedIsin)
        );
    }

    #[test]
    fn test_arbitrary_bytes_never_panic() {
        let c = classifier();
        let mut seed: u32 = 7;
        for len in 0..128 {
            let data: Vec<u8> = (0..len)
                .map(|_| {
                    seed = seed.wrapping_mul(1_103_515_245).wrapping_add(12_345);
                    (seed >> 16) as u8
                })
                .collect();
            for kind in [FeedKind::Futures, FeedKind::Call, FeedKind::Put] {
                let _ = c.classify(kind, &data);
            }
        }
    }

    #[test]
    fn test_config_parsing() {
        assert!(parse_tr_code("A301F").is_ok());
        assert!(matches!(
            parse_tr_code("A301"),
            Err(ConfigError::InvalidTrCode(_))
        ));
        assert!(matches!(
            parse_prefix("KR4-24"),
            Err(ConfigError::InvalidPrefix(_))
        ));
        assert!(matches!(
            parse_prefix("KR4A2"),
            Err(ConfigError::InvalidPrefix(_))
        ));
    }

    #[test]
    fn test_from_config_merges_prefix_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "# stock futures master").unwrap();
        writeln!(file, "KR4A25").unwrap();
        writeln!(file).unwrap();
        writeln!(file, "KR4ABN  # trailing comment").unwrap();

        let config = ClassifierConfig {
            stock_futures_prefixes: vec!["KR4A24".to_string()],
            stock_futures_prefix_file: Some(file.path().to_path_buf()),
            ..ClassifierConfig::default()
        };
        let c = Classifier::from_config(&config).unwrap();
        assert_eq!(c.stock_futures_count(), 3);
        assert_eq!(c.stock_options_count(), 0);
        assert_eq!(c.tr_code_count(), 18);
        assert_eq!(
            c.classify(FeedKind::Futures, &packet("A301F", "KR4ABN000001")),
            Classification::Classified(Category::FuturesStock)
        );
    }
}
