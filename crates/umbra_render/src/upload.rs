//! GPU Upload Collaborator
//!
//! The registry does not talk to a graphics API. At the end of every tick it
//! hands its [`CommandStream`] to a [`CommandUploader`], which decides how
//! many records to drain and where their bytes go.
//!
//! [`StagingBuffer`] is the CPU-side implementation: a float buffer sized for
//! a fixed number of records that a backend copies into its command buffer
//! together with [`StagingBuffer::record_count`].

use crate::command::{CommandSink, CommandStream, RECORD_FIELDS};

/// Consumes the command stream once per frame
pub trait CommandUploader {
    /// Drain (part of) the stream, returning the number of records taken
    fn upload(&mut self, commands: &mut CommandStream) -> usize;
}

impl<F> CommandUploader for F
where
    F: FnMut(&mut CommandStream) -> usize,
{
    fn upload(&mut self, commands: &mut CommandStream) -> usize {
        self(commands)
    }
}

/// Default number of records drained per frame
pub const DEFAULT_STAGING_RECORDS: usize = 1024;

/// CPU staging buffer for command records
#[derive(Clone, Debug)]
pub struct StagingBuffer {
    data: Vec<f32>,
    capacity: usize,
    record_count: usize,
    total_uploaded: u64,
}

impl StagingBuffer {
    /// Create a buffer holding up to `capacity` records per frame
    pub fn new(capacity: usize) -> Self {
        Self {
            data: vec![0.0; capacity * RECORD_FIELDS],
            capacity,
            record_count: 0,
            total_uploaded: 0,
        }
    }

    /// Records written by the last upload
    pub fn record_count(&self) -> usize {
        self.record_count
    }

    /// Records accepted per upload
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Records uploaded over the buffer's lifetime
    pub fn total_uploaded(&self) -> u64 {
        self.total_uploaded
    }

    /// Bytes of the records written by the last upload
    pub fn bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.data[..self.record_count * RECORD_FIELDS])
    }

    /// Fields of record `index` from the last upload
    pub fn record(&self, index: usize) -> Option<&[f32]> {
        if index >= self.record_count {
            return None;
        }
        let start = index * RECORD_FIELDS;
        Some(&self.data[start..start + RECORD_FIELDS])
    }
}

impl Default for StagingBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_STAGING_RECORDS)
    }
}

impl CommandSink for StagingBuffer {
    fn write_record(&mut self, index: usize, bytes: &[u8]) {
        let bytes_out: &mut [u8] = bytemuck::cast_slice_mut(&mut self.data[..]);
        bytes_out.write_record(index, bytes);
    }

    fn record_capacity(&self) -> usize {
        self.capacity
    }
}

impl CommandUploader for StagingBuffer {
    fn upload(&mut self, commands: &mut CommandStream) -> usize {
        let limit = self.capacity;
        let written = commands.drain_into(self, limit);
        self.record_count = written;
        self.total_uploaded += written as u64;
        if !commands.is_empty() {
            log::debug!(
                target: "umbra::lights",
                "Staging buffer full, {} commands deferred to next frame",
                commands.len()
            );
        }
        written
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{CommandKind, CommandRecord, RECORD_BYTES};

    fn remove_light(slot: i32) -> CommandRecord {
        let mut cmd = CommandRecord::new(CommandKind::RemoveLight);
        cmd.push_int(slot).unwrap();
        cmd
    }

    #[test]
    fn test_staging_upload() {
        let mut stream = CommandStream::new();
        stream.enqueue(remove_light(3));
        stream.enqueue(remove_light(9));

        let mut staging = StagingBuffer::new(8);
        assert_eq!(staging.upload(&mut stream), 2);
        assert_eq!(staging.record_count(), 2);
        assert_eq!(staging.bytes().len(), 2 * RECORD_BYTES);
        assert_eq!(staging.record(1).unwrap()[1], 9.0);
        assert!(staging.record(2).is_none());
        assert!(stream.is_empty());
    }

    #[test]
    fn test_staging_defers_overflow() {
        let mut stream = CommandStream::new();
        for slot in 0..5 {
            stream.enqueue(remove_light(slot));
        }

        let mut staging = StagingBuffer::new(2);
        assert_eq!(staging.upload(&mut stream), 2);
        assert_eq!(staging.upload(&mut stream), 2);
        assert_eq!(staging.record(0).unwrap()[1], 2.0);
        assert_eq!(staging.upload(&mut stream), 1);
        assert_eq!(staging.upload(&mut stream), 0);
        assert_eq!(staging.total_uploaded(), 5);
    }

    #[test]
    fn test_staged_bytes_match_records() {
        let mut stream = CommandStream::new();
        let record = remove_light(7);
        stream.enqueue(record);

        let mut staging = StagingBuffer::new(4);
        staging.upload(&mut stream);

        assert_eq!(staging.bytes(), record.as_bytes());
        assert_eq!(staging.record(0).unwrap(), record.fields());
    }

    #[test]
    fn test_closure_uploader() {
        let mut stream = CommandStream::new();
        stream.enqueue(remove_light(0));

        let mut seen = 0;
        let mut uploader = |commands: &mut CommandStream| {
            seen = commands.len();
            0
        };
        assert_eq!(uploader.upload(&mut stream), 0);
        assert_eq!(seen, 1);
        assert_eq!(stream.len(), 1);
    }
}
