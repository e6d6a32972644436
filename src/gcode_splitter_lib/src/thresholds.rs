use crate::error::{Result, SplitError};
use crate::Mm;
use ordered_float::OrderedFloat;
use std::collections::VecDeque;
use std::fmt;

// Suffixes are checked in this order and the first one that matches wins, so a
// token never lands in both queues.
const HEIGHT_SUFFIX: &str = "mm";
const LAYER_SUFFIX: &str = "l";

pub type Height = OrderedFloat<Mm>;

/// Split points of one unit, ascending. Only ever shrinks, from the front.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThresholdQueue<T> {
    queue: VecDeque<T>,
}

impl<T> Default for ThresholdQueue<T> {
    fn default() -> Self {
        ThresholdQueue { queue: VecDeque::new() }
    }
}

impl<T: Ord + Copy> ThresholdQueue<T> {
    pub fn new(mut values: Vec<T>) -> Self {
        values.sort();
        ThresholdQueue { queue: values.into() }
    }

    pub fn head(&self) -> Option<T> {
        self.queue.front().copied()
    }

    /// Strictly greater than; landing exactly on the threshold doesn't count.
    pub fn is_exceeded_by(&self, value: T) -> bool {
        match self.head() {
            Some(head) => value > head,
            None => false,
        }
    }

    pub fn pop(&mut self) -> Option<T> {
        self.queue.pop_front()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = T> + '_ {
        self.queue.iter().copied()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SplitPoint {
    Height(Mm),
    Layer(u64),
}

impl fmt::Display for SplitPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SplitPoint::Height(mm) => write!(f, "{}mm", mm),
            SplitPoint::Layer(layer) => write!(f, "{}l", layer),
        }
    }
}

impl SplitPoint {
    pub fn parse(token: &str) -> Result<SplitPoint> {
        let trimmed = token.trim();
        let lower = trimmed.to_ascii_lowercase();

        if let Some(number) = lower.strip_suffix(HEIGHT_SUFFIX) {
            let mm: Mm = number
                .parse()
                .map_err(|e| SplitError::format(token, format!("'{}' is not a number ({})", number, e)))?;
            if !mm.is_finite() {
                return Err(SplitError::format(token, "height must be a finite number"));
            }
            return Ok(SplitPoint::Height(mm));
        }

        if let Some(number) = lower.strip_suffix(LAYER_SUFFIX) {
            let layer: u64 = number
                .parse()
                .map_err(|e| SplitError::format(token, format!("'{}' is not a layer count ({})", number, e)))?;
            return Ok(SplitPoint::Layer(layer));
        }

        Err(SplitError::format(token, "expected a unit of 'mm' (height) or 'l' (layers)"))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Thresholds {
    pub heights: ThresholdQueue<Height>,
    pub layers: ThresholdQueue<u64>,
}

impl Thresholds {
    pub fn parse<I, S>(tokens: I) -> Result<Thresholds>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut heights = vec![];
        let mut layers = vec![];
        for token in tokens {
            match SplitPoint::parse(token.as_ref())? {
                SplitPoint::Height(mm) => heights.push(OrderedFloat(mm)),
                SplitPoint::Layer(layer) => layers.push(layer),
            }
        }
        let thresholds = Thresholds { heights: ThresholdQueue::new(heights), layers: ThresholdQueue::new(layers) };
        log::debug!("height thresholds: {:?}", thresholds.heights.iter().map(|h| h.0).collect::<Vec<_>>());
        log::debug!("layer thresholds: {:?}", thresholds.layers.iter().collect::<Vec<_>>());
        Ok(thresholds)
    }

    /// Whatever hasn't fired yet, heights first.
    pub fn remaining(&self) -> Vec<SplitPoint> {
        self.heights
            .iter()
            .map(|h| SplitPoint::Height(h.0))
            .chain(self.layers.iter().map(SplitPoint::Layer))
            .collect()
    }
}
