//! Append-only history of hop delays and worst links.
//!
//! The [`MeasurementStore`] is read from its XML document at the start
//! of a localization, modified in memory and written back in full. It
//! only ever grows: samples are appended to the series of their
//! [`NodePair`], worst links are prepended to their own list (most
//! recent first). Nothing already written is modified or removed.

mod document;

use self::document::{
    DelayEntry, Delays, Document, MeasurementEntry, Measurements, NodePairEntry, WorstLinkEntry,
    WorstLinks,
};
use crate::{node::NodeId, pair::NodePair};
use quick_xml::{Reader, events::Event};
use serde::Serialize as _;
use std::{
    fs, io,
    path::{Path, PathBuf},
    time::Duration,
};
use thiserror::Error;

const XML_DECLARATION: &str = r#"<?xml version="1.0" encoding="UTF-8"?>"#;
const ROOT_ELEMENT: &str = "network-measurements";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Failed to access measurement store `{}'", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Measurement store `{}' is corrupt", path.display())]
    Corrupt {
        path: PathBuf,
        #[source]
        source: quick_xml::DeError,
    },
    #[error("Measurement store `{}' holds {found} instead of <network-measurements>", path.display())]
    UnexpectedRoot { path: PathBuf, found: String },
    #[error("Measurement store `{}' has a node-pair with {count} node ids", path.display())]
    MalformedPair { path: PathBuf, count: usize },
    #[error("Failed to serialize the measurement store")]
    Serialize(#[source] quick_xml::DeError),
}

/// One hop delay measurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PairDelaySample {
    pub delay: Duration,
    /// time of capture, relative to the start of the run
    pub timestamp: Duration,
}

/// The worst link selected by one measurement cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorstLinkRecord {
    pub pair: NodePair,
    pub delay: Duration,
    pub timestamp: Duration,
}

/// Historical samples of one node pair, oldest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairSeries {
    pair: NodePair,
    /// node ids in the order they were written, kept so that entries
    /// written in non canonical order are saved back untouched
    stored: (NodeId, NodeId),
    samples: Vec<PairDelaySample>,
}

impl PairSeries {
    fn new(pair: NodePair) -> Self {
        Self {
            pair,
            stored: pair.into_nodes(),
            samples: Vec::new(),
        }
    }

    #[inline]
    pub fn pair(&self) -> NodePair {
        self.pair
    }

    pub fn samples(&self) -> &[PairDelaySample] {
        &self.samples
    }

    pub fn append_sample(&mut self, sample: PairDelaySample) {
        self.samples.push(sample);
    }
}

/// In-memory view of the measurement document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MeasurementStore {
    series: Vec<PairSeries>,
    worst_links: Vec<WorstLinkRecord>,
}

impl MeasurementStore {
    /// An empty store, as for the first cycle of a fresh run.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the store from the document at `path`.
    ///
    /// A missing file, or one without any element (blank, or only the
    /// XML declaration and comments), is a fresh store, not an error.
    ///
    /// # Errors
    ///
    /// - [`StoreError::Io`] if the file exists but cannot be read.
    /// - [`StoreError::UnexpectedRoot`] if the file holds some other
    ///   document.
    /// - [`StoreError::Corrupt`] if the content is not a measurement document.
    /// - [`StoreError::MalformedPair`] if a node pair does not hold exactly two node ids.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();

        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(error) if error.kind() == io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no measurement store yet");
                return Ok(Self::new());
            }
            Err(source) => {
                return Err(StoreError::Io {
                    path: path.to_owned(),
                    source,
                });
            }
        };

        match root_element(&content) {
            Ok(Root::Missing) => {
                tracing::debug!(path = %path.display(), "measurement store has no document yet");
                return Ok(Self::new());
            }
            Ok(Root::Element(name)) if name == ROOT_ELEMENT => (),
            Ok(Root::Element(name)) => {
                return Err(StoreError::UnexpectedRoot {
                    path: path.to_owned(),
                    found: format!("<{name}>"),
                });
            }
            Ok(Root::Text) => {
                return Err(StoreError::UnexpectedRoot {
                    path: path.to_owned(),
                    found: "text".to_owned(),
                });
            }
            Err(error) => {
                return Err(StoreError::Corrupt {
                    path: path.to_owned(),
                    source: error.into(),
                });
            }
        }

        let document: Document =
            quick_xml::de::from_str(&content).map_err(|source| StoreError::Corrupt {
                path: path.to_owned(),
                source,
            })?;

        Self::from_document(document).map_err(|count| StoreError::MalformedPair {
            path: path.to_owned(),
            count,
        })
    }

    /// Write the whole store to `path`.
    ///
    /// The document is written to a sibling temporary file first and
    /// then renamed over `path`, readers never see a partial document.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), StoreError> {
        let path = path.as_ref();
        let content = self.to_xml()?;

        let mut temporary = path.as_os_str().to_owned();
        temporary.push(".tmp");
        let temporary = PathBuf::from(temporary);

        let io_error = |source| StoreError::Io {
            path: path.to_owned(),
            source,
        };
        fs::write(&temporary, content).map_err(io_error)?;
        fs::rename(&temporary, path).map_err(io_error)
    }

    /// Render the store as an XML document.
    pub fn to_xml(&self) -> Result<String, StoreError> {
        let document = self.to_document();

        let mut buffer = String::from(XML_DECLARATION);
        buffer.push('\n');
        let mut serializer = quick_xml::se::Serializer::new(&mut buffer);
        serializer.indent(' ', 2);
        document
            .serialize(serializer)
            .map_err(StoreError::Serialize)?;
        buffer.push('\n');

        Ok(buffer)
    }

    /// Get the series of `pair`, appending a new empty one if the pair
    /// was never measured.
    ///
    /// Stored entries are matched on their canonical pair, whatever the
    /// order their node ids were written in.
    pub fn find_or_create_pair_series(&mut self, pair: NodePair) -> &mut PairSeries {
        let index = match self.series.iter().position(|series| series.pair == pair) {
            Some(index) => index,
            None => {
                self.series.push(PairSeries::new(pair));
                self.series.len() - 1
            }
        };
        &mut self.series[index]
    }

    pub fn append_sample(&mut self, pair: NodePair, sample: PairDelaySample) {
        self.find_or_create_pair_series(pair).append_sample(sample);
    }

    /// Record the worst link of a cycle, ahead of the older ones.
    pub fn append_worst_link(&mut self, record: WorstLinkRecord) {
        self.worst_links.insert(0, record);
    }

    pub fn series(&self, pair: NodePair) -> Option<&PairSeries> {
        self.series.iter().find(|series| series.pair == pair)
    }

    /// every pair series, in order of first appearance
    pub fn all_series(&self) -> &[PairSeries] {
        &self.series
    }

    /// worst links, most recent first
    pub fn worst_links(&self) -> &[WorstLinkRecord] {
        &self.worst_links
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty() && self.worst_links.is_empty()
    }

    /// Build the store from a parsed document, failing with the number
    /// of node ids of the first malformed node pair.
    fn from_document(document: Document) -> Result<Self, usize> {
        let mut store = Self::new();

        for entry in document.worst_links.entries {
            let (a, b) = stored_nodes(&entry.node_pair)?;
            store.worst_links.push(WorstLinkRecord {
                pair: NodePair::new((a, b)),
                delay: Duration::from_nanos(entry.delay_value),
                timestamp: Duration::from_nanos(entry.timestamp),
            });
        }

        for entry in document.delays.entries {
            let stored = stored_nodes(&entry.node_pair)?;
            let samples = entry
                .measurements
                .entries
                .into_iter()
                .map(|measurement| PairDelaySample {
                    delay: Duration::from_nanos(measurement.delay_value),
                    timestamp: Duration::from_nanos(measurement.timestamp),
                });

            let pair = NodePair::new(stored);
            match store.series.iter_mut().find(|series| series.pair == pair) {
                Some(series) => {
                    // both orders were written by older writers, keep
                    // the merged series oldest first
                    series.samples.extend(samples);
                    series.samples.sort_by_key(|sample| sample.timestamp);
                }
                None => store.series.push(PairSeries {
                    pair,
                    stored,
                    samples: samples.collect(),
                }),
            }
        }

        Ok(store)
    }

    fn to_document(&self) -> Document {
        let worst_links = self
            .worst_links
            .iter()
            .map(|record| WorstLinkEntry {
                delay_value: nanos(record.delay),
                timestamp: nanos(record.timestamp),
                node_pair: node_pair_entry(record.pair.into_nodes()),
            })
            .collect();

        let delays = self
            .series
            .iter()
            .map(|series| DelayEntry {
                node_pair: node_pair_entry(series.stored),
                measurements: Measurements {
                    entries: series
                        .samples
                        .iter()
                        .map(|sample| MeasurementEntry {
                            delay_value: nanos(sample.delay),
                            timestamp: nanos(sample.timestamp),
                        })
                        .collect(),
                },
            })
            .collect();

        Document {
            worst_links: WorstLinks {
                entries: worst_links,
            },
            delays: Delays { entries: delays },
        }
    }
}

/// What the document starts with.
enum Root {
    /// no element at all
    Missing,
    Element(String),
    /// text outside of any element
    Text,
}

fn root_element(content: &str) -> Result<Root, quick_xml::Error> {
    let mut reader = Reader::from_str(content);

    loop {
        match reader.read_event()? {
            Event::Start(element) | Event::Empty(element) => {
                let name = String::from_utf8_lossy(element.name().as_ref()).into_owned();
                return Ok(Root::Element(name));
            }
            Event::Text(text) if !text.iter().all(u8::is_ascii_whitespace) => {
                return Ok(Root::Text);
            }
            Event::Eof => return Ok(Root::Missing),
            _ => (),
        }
    }
}

fn stored_nodes(entry: &NodePairEntry) -> Result<(NodeId, NodeId), usize> {
    match entry.node_ids.as_slice() {
        [a, b] => Ok((NodeId::new(*a), NodeId::new(*b))),
        ids => Err(ids.len()),
    }
}

fn node_pair_entry((a, b): (NodeId, NodeId)) -> NodePairEntry {
    NodePairEntry {
        node_ids: vec![a.into_inner(), b.into_inner()],
    }
}

fn nanos(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}
