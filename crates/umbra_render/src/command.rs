//! GPU Command Stream
//!
//! Every change to light or shadow-source state is serialized into a
//! fixed-size [`CommandRecord`] and queued on a [`CommandStream`]. Once per
//! frame the upload collaborator drains the queue into a GPU-visible buffer,
//! where a compute pass applies the commands in order.
//!
//! # Wire Format
//!
//! ```text
//! [record 0: 32 × f32][record 1: 32 × f32] ...
//! field 0     command tag (integer)
//! field 1..   command payload
//! ```
//!
//! | Command          | Payload                                                     |
//! |------------------|-------------------------------------------------------------|
//! | `StoreLight`     | slot, light type, ies index, first source slot or -1, position(3), color×energy(3), type data |
//! | `RemoveLight`    | slot                                                        |
//! | `StoreSource`    | slot, view-projection(16), atlas uv(4)                      |
//! | `RemoveSources`  | first slot, count                                           |
//!
//! The destination buffer is a float buffer on some targets, so integer
//! fields are packed according to [`IntPacking`].

use std::collections::VecDeque;
use std::fmt;

use glam::{Mat3, Mat4, Vec3, Vec4};
use serde::{Deserialize, Serialize};

use crate::error::CommandError;

/// Number of fields in every record (wire format, never changes)
pub const RECORD_FIELDS: usize = 32;

/// Size of one record in bytes
pub const RECORD_BYTES: usize = RECORD_FIELDS * core::mem::size_of::<f32>();

/// Command type tag written as field 0
#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CommandKind {
    /// Never emitted; the tag of a zeroed record
    Invalid = 0,
    /// Store a light in its slot
    StoreLight = 1,
    /// Clear a light slot
    RemoveLight = 2,
    /// Store a shadow source in its slot
    StoreSource = 3,
    /// Clear a consecutive range of shadow source slots
    RemoveSources = 4,
}

impl CommandKind {
    /// Decode a command tag
    pub fn from_tag(tag: i32) -> Option<Self> {
        match tag {
            0 => Some(Self::Invalid),
            1 => Some(Self::StoreLight),
            2 => Some(Self::RemoveLight),
            3 => Some(Self::StoreSource),
            4 => Some(Self::RemoveSources),
            _ => None,
        }
    }
}

/// How integer fields are stored in the float payload
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum IntPacking {
    /// Numeric conversion (`7` is stored as `7.0`)
    #[default]
    Convert,
    /// Bit reinterpretation (the i32 bit pattern is stored unchanged)
    Reinterpret,
}

impl IntPacking {
    /// Encode an integer as a payload field
    #[inline]
    pub fn encode(self, value: i32) -> f32 {
        match self {
            IntPacking::Convert => value as f32,
            IntPacking::Reinterpret => bytemuck::cast(value),
        }
    }

    /// Decode a payload field back into an integer
    #[inline]
    pub fn decode(self, field: f32) -> i32 {
        match self {
            IntPacking::Convert => field as i32,
            IntPacking::Reinterpret => bytemuck::cast(field),
        }
    }
}

/// One serialized GPU state mutation
#[derive(Clone, Copy, PartialEq)]
pub struct CommandRecord {
    kind: CommandKind,
    packing: IntPacking,
    len: usize,
    data: [f32; RECORD_FIELDS],
}

impl CommandRecord {
    /// Create a zero-filled record tagged with `kind`, using converted ints
    pub fn new(kind: CommandKind) -> Self {
        Self::with_packing(kind, IntPacking::default())
    }

    /// Create a zero-filled record tagged with `kind`
    pub fn with_packing(kind: CommandKind, packing: IntPacking) -> Self {
        let mut data = [0.0; RECORD_FIELDS];
        data[0] = packing.encode(kind as i32);
        Self {
            kind,
            packing,
            len: 1,
            data,
        }
    }

    fn reserve(&mut self, count: usize) -> Result<usize, CommandError> {
        let start = self.len;
        if start + count > RECORD_FIELDS {
            return Err(CommandError::Overflow {
                kind: self.kind,
                requested: start + count,
                capacity: RECORD_FIELDS,
            });
        }
        self.len += count;
        Ok(start)
    }

    fn push_slice(&mut self, values: &[f32]) -> Result<(), CommandError> {
        let start = self.reserve(values.len())?;
        self.data[start..start + values.len()].copy_from_slice(values);
        Ok(())
    }

    /// Append an integer
    pub fn push_int(&mut self, value: i32) -> Result<(), CommandError> {
        let field = self.packing.encode(value);
        self.push_slice(&[field])
    }

    /// Append a float
    pub fn push_float(&mut self, value: f32) -> Result<(), CommandError> {
        self.push_slice(&[value])
    }

    /// Append a 3-component vector
    pub fn push_vec3(&mut self, value: Vec3) -> Result<(), CommandError> {
        self.push_slice(&value.to_array())
    }

    /// Append a 4-component vector
    pub fn push_vec4(&mut self, value: Vec4) -> Result<(), CommandError> {
        self.push_slice(&value.to_array())
    }

    /// Append a 3x3 matrix (column-major)
    pub fn push_mat3(&mut self, value: Mat3) -> Result<(), CommandError> {
        self.push_slice(&value.to_cols_array())
    }

    /// Append a 4x4 matrix (column-major)
    pub fn push_mat4(&mut self, value: Mat4) -> Result<(), CommandError> {
        self.push_slice(&value.to_cols_array())
    }

    /// Command type
    pub fn kind(&self) -> CommandKind {
        self.kind
    }

    /// Integer packing used by this record
    pub fn packing(&self) -> IntPacking {
        self.packing
    }

    /// Number of fields written, including the tag
    pub fn len(&self) -> usize {
        self.len
    }

    /// A record always holds at least its tag
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Raw field value
    pub fn field(&self, index: usize) -> f32 {
        self.data[index]
    }

    /// Field decoded as an integer
    pub fn int_field(&self, index: usize) -> i32 {
        self.packing.decode(self.data[index])
    }

    /// All fields, including the unused zero tail
    pub fn fields(&self) -> &[f32; RECORD_FIELDS] {
        &self.data
    }

    /// Wire representation
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.data)
    }
}

impl fmt::Debug for CommandRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandRecord")
            .field("kind", &self.kind)
            .field("len", &self.len)
            .field("data", &&self.data[..self.len])
            .finish()
    }
}

/// Receives drained records
///
/// Implemented by whatever owns the GPU-visible destination. Each record
/// must land at byte offset `index * RECORD_BYTES`.
pub trait CommandSink {
    /// Place one record's bytes at record position `index`
    fn write_record(&mut self, index: usize, bytes: &[u8]);

    /// Number of records the sink can hold
    fn record_capacity(&self) -> usize;
}

impl CommandSink for [u8] {
    fn write_record(&mut self, index: usize, bytes: &[u8]) {
        let offset = index * RECORD_BYTES;
        self[offset..offset + bytes.len()].copy_from_slice(bytes);
    }

    fn record_capacity(&self) -> usize {
        self.len() / RECORD_BYTES
    }
}

impl CommandSink for Vec<u8> {
    fn write_record(&mut self, index: usize, bytes: &[u8]) {
        self.as_mut_slice().write_record(index, bytes);
    }

    fn record_capacity(&self) -> usize {
        self.as_slice().record_capacity()
    }
}

/// FIFO queue of command records
#[derive(Clone, Debug, Default)]
pub struct CommandStream {
    queue: VecDeque<CommandRecord>,
    total_enqueued: u64,
}

impl CommandStream {
    /// Create an empty stream
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record
    pub fn enqueue(&mut self, record: CommandRecord) {
        self.queue.push_back(record);
        self.total_enqueued += 1;
    }

    /// Write up to `limit` of the oldest records into `dest` and remove them
    ///
    /// Record `i` is written at byte offset `i * RECORD_BYTES`. The limit is
    /// further bounded by how many whole records fit into `dest`. Returns the
    /// number of records written.
    pub fn drain(&mut self, dest: &mut [u8], limit: usize) -> usize {
        self.drain_into(dest, limit)
    }

    /// Write up to `limit` of the oldest records into a sink and remove them
    pub fn drain_into<S: CommandSink + ?Sized>(&mut self, sink: &mut S, limit: usize) -> usize {
        let count = limit.min(self.queue.len()).min(sink.record_capacity());
        for (index, record) in self.queue.drain(..count).enumerate() {
            sink.write_record(index, record.as_bytes());
        }
        count
    }

    /// Queued records, oldest first
    pub fn iter(&self) -> impl Iterator<Item = &CommandRecord> {
        self.queue.iter()
    }

    /// Number of queued records
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Check if nothing is queued
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Number of records ever enqueued
    pub fn total_enqueued(&self) -> u64 {
        self.total_enqueued
    }

    /// Drop every queued record
    pub fn clear(&mut self) {
        self.queue.clear();
    }
}
