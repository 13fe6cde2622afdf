use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

use anyhow::Result;

const CHUNK_SIZE: usize = 64 * 1024;

/// Capture input from a file or a stdin pipe ("-").
///
/// Files report their size up front through `len_hint` so callers can
/// show a sized progress bar; pipes cannot.
pub struct InputReader {
    reader: Box<dyn Read>,
    is_pipe: bool,
    len_hint: Option<u64>,
}

impl InputReader {
    pub fn new<P: AsRef<Path>>(input_path: P) -> Result<Self> {
        let path_str = input_path.as_ref().to_string_lossy();
        let is_pipe = path_str == "-";

        let (reader, len_hint): (Box<dyn Read>, Option<u64>) = if is_pipe {
            (Box::new(io::stdin().lock()), None)
        } else {
            let file = File::open(input_path)?;
            let len = file.metadata().map(|m| m.len()).ok();
            (Box::new(BufReader::new(file)), len)
        };

        Ok(Self {
            reader,
            is_pipe,
            len_hint,
        })
    }

    pub fn is_pipe(&self) -> bool {
        self.is_pipe
    }

    /// Input size in bytes, when the source can tell up front.
    pub fn len_hint(&self) -> Option<u64> {
        self.len_hint
    }

    /// Reads the input to the end in chunks, reporting the running
    /// byte count after each chunk.
    pub fn read_samples(&mut self, mut progress: impl FnMut(u64)) -> Result<Vec<u8>> {
        let mut samples = match self.len_hint {
            Some(len) => Vec::with_capacity(len as usize),
            None => Vec::new(),
        };
        let mut buffer = vec![0u8; CHUNK_SIZE];

        loop {
            let bytes_read = self.reader.read(&mut buffer)?;
            if bytes_read == 0 {
                break;
            }

            samples.extend_from_slice(&buffer[..bytes_read]);
            progress(samples.len() as u64);
        }

        Ok(samples)
    }
}
