use std::fs::File;
use std::io::{BufWriter, Write, self};

/// A debug structure to record rendered signals so they can be examined by debug apps
pub struct SignalLogger {
    out: Option<BufWriter<File>>
}

impl SignalLogger {
    pub fn new(out_filename: &str) -> io::Result<Self> {
        let f = File::create(out_filename)?;
        let out = Some(BufWriter::new(f));
        Ok(Self { out })
    }

    pub fn new_sink() -> Self {
        let out = None;
        Self { out }
    }

    /// Writes one `source:<big endian f32 samples>\n` record
    pub fn log(&mut self, source: &str, signal: &[f32]) -> io::Result<()> {
        let out = match &mut self.out {
            Some(out) => out,
            None => return Ok(())
        };
        out.write_all(source.as_bytes())?;
        out.write_all(b":")?;
        for sample in signal.iter() {
            out.write_all(&sample.to_be_bytes())?;
        }
        out.write_all(b"\n")?;
        Ok(())
    }
}
