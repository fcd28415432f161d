use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use crate::model::Event;

/// Larger length prefixes can only come from a corrupt entry.
pub(crate) const MAX_ENTRY_LEN: usize = 16 * 1024 * 1024;

/// Encode a single event as `[len][bincode][crc32]`. Nothing is written
/// if the event can't be encoded.
fn encode_event(writer: &mut impl Write, event: &Event) -> io::Result<()> {
    let payload =
        bincode::serialize(event).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    // Replay stops at anything longer, so never write it.
    if payload.len() > MAX_ENTRY_LEN {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "event too large"));
    }
    writer.write_all(&(payload.len() as u32).to_le_bytes())?;
    writer.write_all(&payload)?;
    writer.write_all(&crc32fast::hash(&payload).to_le_bytes())?;
    Ok(())
}

/// Fill `buf`, or return `Ok(false)` if the file ends first.
fn read_or_eof(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<bool> {
    match reader.read_exact(buf) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e),
    }
}

/// Decode the next entry and its encoded size. `None` at end of file or at
/// the first torn/corrupt entry.
fn decode_next(reader: &mut impl Read) -> io::Result<Option<(Event, u64)>> {
    let mut len_buf = [0u8; 4];
    if !read_or_eof(reader, &mut len_buf)? {
        return Ok(None);
    }
    let len = u32::from_le_bytes(len_buf) as usize;
    if len > MAX_ENTRY_LEN {
        return Ok(None);
    }
    let mut payload = vec![0u8; len];
    if !read_or_eof(reader, &mut payload)? {
        return Ok(None);
    }
    let mut crc_buf = [0u8; 4];
    if !read_or_eof(reader, &mut crc_buf)? {
        return Ok(None);
    }
    if u32::from_le_bytes(crc_buf) != crc32fast::hash(&payload) {
        return Ok(None);
    }
    Ok(bincode::deserialize::<Event>(&payload)
        .ok()
        .map(|event| (event, 8 + len as u64)))
}

fn open_append(path: &Path) -> io::Result<(File, u64)> {
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let len = file.metadata()?.len();
    Ok((file, len))
}

/// Append-only write-ahead log of store events.
///
/// Entry format: `[u32 LE: len][bincode: Event][u32 LE: crc32 of payload]`.
/// A torn last entry (crash mid-write) fails the length or CRC check and is
/// dropped on replay, together with anything after it.
pub struct Wal {
    file: File,
    path: PathBuf,
    /// Encoded entries waiting for `flush_sync`.
    pending: Vec<u8>,
    pending_count: u64,
    /// Length of the file up to the last successful sync.
    synced_len: u64,
    appends_since_compact: u64,
}

impl Wal {
    /// Open (or create) the WAL file at `path`.
    pub fn open(path: &Path) -> io::Result<Self> {
        let (file, synced_len) = open_append(path)?;
        Ok(Self {
            file,
            path: path.to_path_buf(),
            pending: Vec::new(),
            pending_count: 0,
            synced_len,
            appends_since_compact: 0,
        })
    }

    /// Append and fsync one event. The journal writer uses
    /// `append_buffered` + `flush_sync` to commit batches instead.
    #[cfg(test)]
    pub fn append(&mut self, event: &Event) -> io::Result<()> {
        self.append_buffered(event)?;
        self.flush_sync()
    }

    /// Buffer an event without writing it. Durable only after `flush_sync()`.
    pub fn append_buffered(&mut self, event: &Event) -> io::Result<()> {
        encode_event(&mut self.pending, event)?;
        self.pending_count += 1;
        Ok(())
    }

    /// Drop every buffered event that has not been flushed yet.
    pub fn discard_pending(&mut self) {
        self.pending.clear();
        self.pending_count = 0;
    }

    /// Write the buffered events and fsync the file. On failure the file is
    /// cut back to its last synced length, so a failed batch never shows up
    /// on replay.
    pub fn flush_sync(&mut self) -> io::Result<()> {
        let written = self.pending.len() as u64;
        let count = self.pending_count;
        let result = self
            .file
            .write_all(&self.pending)
            .and_then(|()| self.file.sync_all());
        self.discard_pending();

        match result {
            Ok(()) => {
                self.synced_len += written;
                self.appends_since_compact += count;
                Ok(())
            }
            Err(e) => {
                if let Err(cut) = self
                    .file
                    .set_len(self.synced_len)
                    .and_then(|()| self.file.sync_all())
                {
                    tracing::error!(
                        "{}: could not cut failed batch off the journal: {cut}",
                        self.path.display()
                    );
                }
                Err(e)
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn compact_path(path: &Path) -> PathBuf {
        path.with_extension("wal.tmp")
    }

    /// Write the compacted event set to a side file and fsync it.
    pub fn write_compact_file(path: &Path, events: &[Event]) -> io::Result<()> {
        let mut writer = BufWriter::new(File::create(Self::compact_path(path))?);
        for event in events {
            encode_event(&mut writer, event)?;
        }
        writer.flush()?;
        writer.get_ref().sync_all()
    }

    /// Rename the side file over the WAL and reopen for appends.
    pub fn swap_compact_file(&mut self) -> io::Result<()> {
        fs::rename(Self::compact_path(&self.path), &self.path)?;
        let (file, synced_len) = open_append(&self.path)?;
        self.file = file;
        self.synced_len = synced_len;
        self.discard_pending();
        self.appends_since_compact = 0;
        Ok(())
    }

    #[cfg(test)]
    pub fn compact(&mut self, events: &[Event]) -> io::Result<()> {
        Self::write_compact_file(&self.path, events)?;
        self.swap_compact_file()
    }

    pub fn appends_since_compact(&self) -> u64 {
        self.appends_since_compact
    }

    /// Read every valid event from disk, plus the byte length they occupy.
    fn read_valid(path: &Path) -> io::Result<(Vec<Event>, u64)> {
        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok((Vec::new(), 0)),
            Err(e) => return Err(e),
        };
        let mut reader = BufReader::new(file);
        let mut events = Vec::new();
        let mut valid_len = 0;
        while let Some((event, size)) = decode_next(&mut reader)? {
            events.push(event);
            valid_len += size;
        }
        Ok((events, valid_len))
    }

    /// Read every valid event from disk. A missing file replays as empty.
    pub fn replay(path: &Path) -> io::Result<Vec<Event>> {
        Self::read_valid(path).map(|(events, _)| events)
    }

    /// Replay, then cut off a torn or corrupt tail so new appends follow
    /// the last valid entry.
    pub fn recover(path: &Path) -> io::Result<Vec<Event>> {
        let (events, valid_len) = Self::read_valid(path)?;
        match fs::metadata(path) {
            Ok(meta) if meta.len() > valid_len => {
                tracing::warn!(
                    "{}: discarding {} byte(s) of torn journal tail",
                    path.display(),
                    meta.len() - valid_len
                );
                let file = OpenOptions::new().write(true).open(path)?;
                file.set_len(valid_len)?;
                file.sync_all()?;
            }
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
        Ok(events)
    }
}
