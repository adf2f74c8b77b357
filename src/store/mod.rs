//! Subscriber store
//!
//! An immutable, sorted table of subscriber records consulted by the server.
//! It is built once at startup, capacity-bounded, and answers exact-match
//! lookups by binary search.
//!
//! The text source holds one record per line, either in the spaced form
//!
//! ```text
//! 111-222-3333 07 1
//! ```
//!
//! (dashes optional) or packed fixed-width as `1112223333071`: a ten-digit
//! subscriber number, a two-digit tech type and a `0`/`1` paid flag.

use std::fs;
use std::path::Path;
use std::str::FromStr;

use crate::core::{Error, Result, SubscriberNumber, TechType, MAX_RECORDS};

const NUMBER_DIGITS: usize = 10;
const TECH_DIGITS: usize = 2;

/// One subscriber entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriberRecord {
    pub number: SubscriberNumber,
    pub tech_type: TechType,
    pub paid: bool,
}

impl SubscriberRecord {
    pub fn new(number: SubscriberNumber, tech_type: TechType, paid: bool) -> Self {
        SubscriberRecord {
            number,
            tech_type,
            paid,
        }
    }
}

impl FromStr for SubscriberRecord {
    type Err = String;

    fn from_str(line: &str) -> std::result::Result<Self, Self::Err> {
        let fields: Vec<&str> = line.split_whitespace().collect();
        let (number, tech, paid) = match fields.as_slice() {
            [number, tech, paid] => (undash(number)?, *tech, *paid),
            [packed] if packed.len() == NUMBER_DIGITS + TECH_DIGITS + 1 && packed.is_ascii() => (
                packed[..NUMBER_DIGITS].to_string(),
                &packed[NUMBER_DIGITS..NUMBER_DIGITS + TECH_DIGITS],
                &packed[NUMBER_DIGITS + TECH_DIGITS..],
            ),
            _ => return Err(format!("expected `number tech paid`, got {:?}", line.trim())),
        };

        let number = parse_digits(&number, NUMBER_DIGITS, "subscriber number")?;
        let tech_type = parse_digits(tech, TECH_DIGITS, "tech type")?;
        let paid = match paid {
            "1" => true,
            "0" => false,
            other => return Err(format!("paid flag must be 0 or 1, got {:?}", other)),
        };

        Ok(SubscriberRecord::new(number, tech_type as TechType, paid))
    }
}

/// Accepts `DDDDDDDDDD` as is and `DDD-DDD-DDDD` with its two dashes removed
fn undash(number: &str) -> std::result::Result<String, String> {
    let bytes = number.as_bytes();
    if !number.contains('-') {
        return Ok(number.to_string());
    }
    if bytes.len() != NUMBER_DIGITS + 2 || bytes[3] != b'-' || bytes[7] != b'-' {
        return Err(format!("subscriber number must look like DDD-DDD-DDDD, got {:?}", number));
    }
    Ok([&number[..3], &number[4..7], &number[8..]].concat())
}

fn parse_digits(text: &str, width: usize, what: &str) -> std::result::Result<u64, String> {
    if text.len() != width || !text.bytes().all(|b| b.is_ascii_digit()) {
        return Err(format!("{} must be {} digits, got {:?}", what, width, text));
    }
    text.parse().map_err(|e| format!("invalid {}: {}", what, e))
}

/// Sorted, read-only collection of subscriber records
#[derive(Debug, Clone)]
pub struct SubscriberStore {
    records: Vec<SubscriberRecord>,
    limit: usize,
}

impl SubscriberStore {
    /// Builds a store holding at most [`MAX_RECORDS`] records
    pub fn build(records: Vec<SubscriberRecord>) -> Result<Self> {
        Self::build_with_limit(records, MAX_RECORDS)
    }

    /// Builds a store holding at most `limit` records.
    ///
    /// Records are sorted by number; a repeated number is an error.
    pub fn build_with_limit(mut records: Vec<SubscriberRecord>, limit: usize) -> Result<Self> {
        if records.len() > limit {
            return Err(Error::Capacity { limit });
        }

        records.sort_unstable_by_key(|record| record.number);
        if let Some(pair) = records.windows(2).find(|pair| pair[0].number == pair[1].number) {
            return Err(Error::DuplicateSubscriber(pair[0].number));
        }

        Ok(SubscriberStore { records, limit })
    }

    /// Parses the text source and builds a store from it
    pub fn parse(text: &str, limit: usize) -> Result<Self> {
        let mut records = Vec::new();

        for (index, line) in text.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            if records.len() == limit {
                return Err(Error::Capacity { limit });
            }
            let record = line
                .parse::<SubscriberRecord>()
                .map_err(|reason| Error::parse(index + 1, reason))?;
            records.push(record);
        }

        Self::build_with_limit(records, limit)
    }

    /// Reads and parses a subscriber file
    pub fn load(path: impl AsRef<Path>, limit: usize) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::parse(&text, limit)
    }

    /// Finds the record for `number`
    pub fn lookup(&self, number: SubscriberNumber) -> Option<&SubscriberRecord> {
        self.records
            .binary_search_by_key(&number, |record| record.number)
            .ok()
            .map(|index| &self.records[index])
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Maximum number of records this store was allowed to hold
    pub fn capacity_limit(&self) -> usize {
        self.limit
    }

    /// Records in ascending number order
    pub fn iter(&self) -> impl Iterator<Item = &SubscriberRecord> {
        self.records.iter()
    }
}

impl FromStr for SubscriberStore {
    type Err = Error;

    fn from_str(text: &str) -> Result<Self> {
        Self::parse(text, MAX_RECORDS)
    }
}
