/// Incremental parser for `text/event-stream` bodies, yielding the data of each event
#[derive(Debug, Default)]
pub struct EventParser {
    buf: Vec<u8>,
}

impl EventParser {
    pub fn new() -> EventParser {
        EventParser::default()
    }

    /// Feeds one chunk of the body, returning the data of every event it completed
    ///
    /// Events without any data line (eg. keep-alive comments) are skipped.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(chunk);
        let mut res = Vec::new();
        while let Some((end, sep_len)) = find_event_end(&self.buf) {
            let block = self.buf.drain(..end + sep_len).collect::<Vec<u8>>();
            if let Some(data) = event_data(&block[..end]) {
                res.push(data);
            }
        }
        res
    }
}

/// Position and length of the first blank-line separator
fn find_event_end(buf: &[u8]) -> Option<(usize, usize)> {
    for i in 0..buf.len() {
        if buf[i..].starts_with(b"\r\n\r\n") {
            return Some((i, 4));
        }
        if buf[i..].starts_with(b"\n\n") || buf[i..].starts_with(b"\r\r") {
            return Some((i, 2));
        }
    }
    None
}

fn event_data(block: &[u8]) -> Option<String> {
    let block = String::from_utf8_lossy(block);
    let mut data: Option<String> = None;
    for line in block.split(['\n', '\r']) {
        let value = match line.strip_prefix("data") {
            Some(rest) if rest.is_empty() => "",
            Some(rest) => match rest.strip_prefix(':') {
                Some(value) => value.strip_prefix(' ').unwrap_or(value),
                // another field whose name starts with "data"
                None => continue,
            },
            None => continue,
        };
        match &mut data {
            None => data = Some(String::from(value)),
            Some(data) => {
                data.push('\n');
                data.push_str(value);
            }
        }
    }
    data
}
