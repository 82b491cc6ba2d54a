//! Interning pools for identifier and string-literal payloads.
//!
//! Both pools store their bytes in a list of fixed-capacity blocks. New
//! entries are bump-allocated at the end of the newest block; when an entry
//! does not fit, a fresh block of `max(block_size, entry_size)` bytes is
//! pushed. A block's buffer never reallocates, and nothing is freed until the
//! pool itself is dropped, so a handle stays valid for the whole compilation.
//!
//! - [`IdentPool`] deduplicates: equal text always yields the same [`Ident`],
//!   so later stages compare and hash identifiers by handle.
//! - [`StringPool`] appends every literal as a fresh length-prefixed copy.

use std::hash::{Hash, Hasher};

use rustc_hash::{FxHashMap, FxHasher};
use snafu::ResultExt;

use crate::error::{CompileResult, PoolExhaustedSnafu};

pub const DEFAULT_IDENT_BLOCK_SIZE: usize = 1 << 10;
pub const DEFAULT_STRING_BLOCK_SIZE: usize = 1 << 12;

const ALIGN: usize = 8;
const LEN_PREFIX: usize = std::mem::size_of::<u64>();

fn round_up(n: usize, align: usize) -> usize {
  n.div_ceil(align) * align
}

/// One bump-allocated block. `data.len()` is the bump pointer and never
/// exceeds the capacity reserved at creation.
#[derive(Debug)]
struct Block {
  data: Vec<u8>,
}

impl Block {
  fn remaining(&self) -> usize {
    self.data.capacity() - self.data.len()
  }
}

/// Growable list of blocks shared by both pools.
#[derive(Debug)]
struct BlockList {
  pool: &'static str,
  block_size: usize,
  blocks: Vec<Block>,
}

impl BlockList {
  fn new(pool: &'static str, block_size: usize) -> Self {
    Self {
      pool,
      block_size: block_size.max(1),
      blocks: Vec::new(),
    }
  }

  /// Reserve `size` bytes in the current block, opening a new block if they
  /// do not fit. Returns `(block, offset)` of the reserved range; the caller
  /// fills it with exactly `size` bytes.
  fn reserve(&mut self, size: usize) -> CompileResult<(usize, usize)> {
    let fits = self
      .blocks
      .last()
      .is_some_and(|block| block.remaining() >= size);
    if !fits {
      let capacity = self.block_size.max(size);
      let mut data = Vec::new();
      data
        .try_reserve_exact(capacity)
        .context(PoolExhaustedSnafu {
          pool: self.pool,
          requested: capacity,
        })?;
      self.blocks.push(Block { data });
    }
    let index = self.blocks.len() - 1;
    let offset = self.blocks[index].data.len();
    Ok((index, offset))
  }

  fn block_mut(&mut self, index: usize) -> &mut Vec<u8> {
    &mut self.blocks[index].data
  }

  fn bytes(&self, block: u32, offset: u32, len: usize) -> &[u8] {
    let start = offset as usize;
    &self.blocks[block as usize].data[start..start + len]
  }
}

/// Handle to an interned identifier. Equal text, equal handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Ident {
  block: u32,
  offset: u32,
  len: u32,
}

/// Deduplicating identifier pool.
#[derive(Debug)]
pub struct IdentPool {
  blocks: BlockList,
  // Text hash -> identifiers with that hash; equality is confirmed against
  // the stored bytes.
  index: FxHashMap<u64, Vec<Ident>>,
  count: usize,
}

impl Default for IdentPool {
  fn default() -> Self {
    Self::new(DEFAULT_IDENT_BLOCK_SIZE)
  }
}

impl IdentPool {
  pub fn new(block_size: usize) -> Self {
    Self {
      blocks: BlockList::new("identifier", block_size),
      index: FxHashMap::default(),
      count: 0,
    }
  }

  fn hash_text(text: &str) -> u64 {
    let mut hasher = FxHasher::default();
    text.hash(&mut hasher);
    hasher.finish()
  }

  /// Return the canonical handle for `text`, copying it into the pool on
  /// first sight.
  pub fn intern(&mut self, text: &str) -> CompileResult<Ident> {
    let hash = Self::hash_text(text);
    if let Some(bucket) = self.index.get(&hash)
      && let Some(&found) = bucket.iter().find(|id| self.resolve(**id) == text)
    {
      return Ok(found);
    }

    // Stored with a terminator so every entry is also a valid C string.
    let (block, offset) = self.blocks.reserve(text.len() + 1)?;
    let data = self.blocks.block_mut(block);
    data.extend_from_slice(text.as_bytes());
    data.push(0);

    let ident = Ident {
      block: block as u32,
      offset: offset as u32,
      len: text.len() as u32,
    };
    self.index.entry(hash).or_default().push(ident);
    self.count += 1;
    Ok(ident)
  }

  /// Text of an interned identifier, without its terminator.
  pub fn resolve(&self, ident: Ident) -> &str {
    let bytes = self
      .blocks
      .bytes(ident.block, ident.offset, ident.len as usize);
    // Only `&str` input is ever copied in, so the bytes are valid UTF-8.
    std::str::from_utf8(bytes).unwrap_or_default()
  }

  /// Number of distinct identifiers.
  pub fn len(&self) -> usize {
    self.count
  }

  pub fn is_empty(&self) -> bool {
    self.count == 0
  }

  pub fn block_count(&self) -> usize {
    self.blocks.blocks.len()
  }
}

/// Handle to a stored string literal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StrRef {
  block: u32,
  offset: u32,
}

/// Append-only string-literal pool; no deduplication.
#[derive(Debug)]
pub struct StringPool {
  blocks: BlockList,
  count: usize,
}

impl Default for StringPool {
  fn default() -> Self {
    Self::new(DEFAULT_STRING_BLOCK_SIZE)
  }
}

impl StringPool {
  pub fn new(block_size: usize) -> Self {
    Self {
      blocks: BlockList::new("string", block_size),
      count: 0,
    }
  }

  /// Store a fresh copy of `bytes`. Embedded zero bytes are kept.
  pub fn store(&mut self, bytes: &[u8]) -> CompileResult<StrRef> {
    let size = round_up(LEN_PREFIX + bytes.len(), ALIGN);
    let (block, offset) = self.blocks.reserve(size)?;
    let data = self.blocks.block_mut(block);
    data.extend_from_slice(&(bytes.len() as u64).to_le_bytes());
    data.extend_from_slice(bytes);
    data.resize(offset + size, 0);
    self.count += 1;
    Ok(StrRef {
      block: block as u32,
      offset: offset as u32,
    })
  }

  /// Exact bytes of a stored literal.
  pub fn resolve(&self, handle: StrRef) -> &[u8] {
    let prefix = self.blocks.bytes(handle.block, handle.offset, LEN_PREFIX);
    let mut len = [0u8; LEN_PREFIX];
    len.copy_from_slice(prefix);
    let len = u64::from_le_bytes(len) as usize;
    let body = handle.offset + LEN_PREFIX as u32;
    self.blocks.bytes(handle.block, body, len)
  }

  /// Number of stored literals.
  pub fn len(&self) -> usize {
    self.count
  }

  pub fn is_empty(&self) -> bool {
    self.count == 0
  }

  pub fn block_count(&self) -> usize {
    self.blocks.blocks.len()
  }
}
