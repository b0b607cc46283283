//! Finite self-maps over the domain `[0, n)`.
//!
//! A self-map is the input to both iteration engines. The engines only ever
//! ask a map for its domain size and for single-step images, so anything that
//! can answer those two questions implements [`SelfMap`]. [`FunctionMap`] is
//! the table-backed implementation used by the harness: it is validated to be
//! total on construction and never changes afterwards.
//!
//! Two on-disk formats are supported:
//! - text: whitespace-separated decimal integers, the k-th integer is `f(k)`
//! - binary: a little-endian `u32` element count followed by that many
//!   little-endian `u32` images

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use rand::Rng;

use crate::error::{IterationError, Result};

/// Upper bound on images reserved up front when reading the binary format.
const MAX_PREALLOCATED_IMAGES: usize = 1 << 16;

/// A function from `[0, size())` to itself, queried one step at a time.
///
/// Implementations must be pure: `apply(x)` returns the same image every
/// time it is called. Totality is not assumed; engines check every image they
/// observe and reject maps that leave the domain.
pub trait SelfMap {
    /// Number of elements in the domain (and codomain).
    fn size(&self) -> usize;

    /// Image of `x` under a single application. Only called with `x < size()`.
    fn apply(&self, x: usize) -> usize;
}

/// Table-backed total self-map.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FunctionMap {
    mapping: Vec<usize>,
}

impl FunctionMap {
    /// Builds a map from its image table, `mapping[x] = f(x)`.
    ///
    /// Fails with [`IterationError::DomainError`] on the first image outside
    /// `[0, mapping.len())`.
    pub fn new(mapping: Vec<usize>) -> Result<Self> {
        let size = mapping.len();
        if let Some((index, &image)) = mapping.iter().enumerate().find(|(_, &y)| y >= size) {
            return Err(IterationError::DomainError { index, image, size });
        }
        Ok(Self { mapping })
    }

    /// Uniformly random map over a domain of `size` elements.
    ///
    /// The random source is supplied by the caller so generation is
    /// reproducible from a seed.
    pub fn random<R: Rng>(size: usize, rng: &mut R) -> Self {
        let mapping = (0..size).map(|_| rng.gen_range(0..size)).collect();
        Self { mapping }
    }

    /// Worst case for segment chaining: a spine `0 -> 1 -> ... -> steps`
    /// ending in a fixed point, where spine element `k` (for `0 < k < steps`)
    /// also receives a branch of `2k` elements. Every branch is deeper than
    /// the one below it, so the decomposition engine chains `steps` segments
    /// from element 0 to the fixed point.
    pub fn staircase(steps: usize) -> Self {
        let mut mapping: Vec<usize> = (1..=steps).collect();
        mapping.push(steps);

        for k in 1..steps {
            let first = mapping.len();
            let len = 2 * k;
            mapping.extend(first + 1..first + len);
            mapping.push(k);
        }
        Self { mapping }
    }

    /// Parses the text format from any reader.
    pub fn from_reader<R: Read>(mut reader: R) -> Result<Self> {
        let mut text = String::new();
        reader.read_to_string(&mut text)?;

        let mapping = text
            .split_whitespace()
            .enumerate()
            .map(|(position, token)| {
                token.parse::<usize>().map_err(|_| IterationError::Parse {
                    position,
                    token: token.to_string(),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Self::new(mapping)
    }

    /// Reads the text format from a file.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        Self::from_reader(BufReader::new(file))
    }

    /// Writes the text format, one image per line.
    pub fn write_text<W: Write>(&self, writer: W) -> Result<()> {
        let mut writer = BufWriter::new(writer);
        for image in &self.mapping {
            writeln!(writer, "{}", image)?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Parses the binary format.
    ///
    /// The element count in the header is not trusted for allocation; a
    /// header claiming more images than the input holds fails with an
    /// unexpected-EOF [`IterationError::IoError`].
    pub fn read_binary<R: Read>(reader: R) -> Result<Self> {
        let mut reader = BufReader::new(reader);
        let count = reader.read_u32::<LittleEndian>()? as usize;

        let mut mapping = Vec::with_capacity(count.min(MAX_PREALLOCATED_IMAGES));
        for _ in 0..count {
            mapping.push(reader.read_u32::<LittleEndian>()? as usize);
        }

        Self::new(mapping)
    }

    /// Writes the binary format. Domains must fit in `u32`.
    pub fn write_binary<W: Write>(&self, writer: W) -> Result<()> {
        let count = u32::try_from(self.mapping.len()).map_err(|_| {
            IterationError::InvalidParameters(format!(
                "domain of {} elements does not fit the binary format",
                self.mapping.len()
            ))
        })?;

        let mut writer = BufWriter::new(writer);
        writer.write_u32::<LittleEndian>(count)?;
        for &image in &self.mapping {
            // image < count, so the cast is lossless
            writer.write_u32::<LittleEndian>(image as u32)?;
        }
        writer.flush()?;
        Ok(())
    }

    pub fn size(&self) -> usize {
        self.mapping.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mapping.is_empty()
    }

    /// Single-step evaluation with a range check on `x`.
    pub fn eval(&self, x: usize) -> Result<usize> {
        self.mapping
            .get(x)
            .copied()
            .ok_or(IterationError::ElementOutOfRange { element: x, size: self.size() })
    }

    /// Naive reference: applies the map `i` times, one step at a time.
    pub fn iterate(&self, x: usize, i: u64) -> Result<usize> {
        self.eval(x)?;
        let mut y = x;
        for _ in 0..i {
            y = self.mapping[y];
        }
        Ok(y)
    }

    /// Number of preimages of every element.
    pub fn in_degrees(&self) -> Vec<usize> {
        let mut degrees = vec![0; self.size()];
        for &image in &self.mapping {
            degrees[image] += 1;
        }
        degrees
    }

    pub fn as_slice(&self) -> &[usize] {
        &self.mapping
    }
}

impl SelfMap for FunctionMap {
    fn size(&self) -> usize {
        self.mapping.len()
    }

    fn apply(&self, x: usize) -> usize {
        self.mapping[x]
    }
}

/// Self-map backed by a closure, e.g. `x -> 2x mod m`.
pub struct FnSelfMap<F> {
    size: usize,
    f: F,
}

impl<F: Fn(usize) -> usize> FnSelfMap<F> {
    pub fn new(size: usize, f: F) -> Self {
        Self { size, f }
    }

    /// Tabulates the closure into a validated [`FunctionMap`].
    pub fn to_function_map(&self) -> Result<FunctionMap> {
        FunctionMap::new((0..self.size).map(|x| (self.f)(x)).collect())
    }
}

impl<F: Fn(usize) -> usize> SelfMap for FnSelfMap<F> {
    fn size(&self) -> usize {
        self.size
    }

    fn apply(&self, x: usize) -> usize {
        (self.f)(x)
    }
}
