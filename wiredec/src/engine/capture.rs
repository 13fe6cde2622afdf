//! Capture buffers and condition-based sample traversal.
//!
//! A capture is a flat array of sample words, one per sample instant,
//! with channel `i` stored in bit `i`. Decoders never index samples
//! directly; they advance a [`Cursor`] by describing the channel
//! conditions they are waiting for, which makes a decoder's cost
//! proportional to the edges it cares about rather than the capture
//! length.

/// Absolute sample index within a capture.
pub type SamplePosition = u64;

/// A recorded capture: samples plus optional acquisition rate.
#[derive(Debug, Clone, Default)]
pub struct Capture {
    samples: Vec<u8>,
    samplerate: Option<f64>,
}

impl Capture {
    pub fn new(samples: Vec<u8>, samplerate: Option<f64>) -> Self {
        Self {
            samples,
            samplerate,
        }
    }

    pub fn len(&self) -> u64 {
        self.samples.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn samplerate(&self) -> Option<f64> {
        self.samplerate
    }

    #[inline(always)]
    pub fn sample(&self, pos: SamplePosition) -> u8 {
        self.samples[pos as usize]
    }

    #[inline(always)]
    pub fn level(&self, pos: SamplePosition, channel: usize) -> bool {
        (self.sample(pos) >> channel) & 1 != 0
    }
}

/// A single channel condition inside a wait term.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cond {
    /// Channel is low.
    Low(usize),
    /// Channel is high.
    High(usize),
    /// Channel transitions low to high.
    Rising(usize),
    /// Channel transitions high to low.
    Falling(usize),
    /// Channel transitions in either direction.
    Edge(usize),
    /// Unconditionally matches `n` samples ahead (at least one).
    Skip(u64),
}

/// Result of a successful wait: where it matched and which terms did.
#[derive(Debug, Clone, Copy)]
pub struct WaitMatch {
    pub pos: SamplePosition,
    pub sample: u8,
    matched: u32,
}

impl WaitMatch {
    /// Whether the `i`-th condition term matched at this position.
    pub fn matched(&self, i: usize) -> bool {
        (self.matched >> i) & 1 != 0
    }

    pub fn level(&self, channel: usize) -> bool {
        (self.sample >> channel) & 1 != 0
    }
}

/// Forward-only traversal over a capture.
#[derive(Debug)]
pub struct Cursor<'a> {
    capture: &'a Capture,
    next: SamplePosition,
}

impl<'a> Cursor<'a> {
    pub fn new(capture: &'a Capture) -> Self {
        Self { capture, next: 0 }
    }

    /// Position of the last match, or 0 before the first wait.
    pub fn pos(&self) -> SamplePosition {
        self.next.saturating_sub(1)
    }

    pub fn capture(&self) -> &'a Capture {
        self.capture
    }

    /// Advances to the earliest sample where any condition term holds.
    ///
    /// Terms are OR-ed together; the returned match records which of
    /// them held so callers can tell a timeout skip from a real edge.
    /// Level terms can match at the current position's successor; edge
    /// terms compare each sample against its predecessor, so they never
    /// match at sample 0. Returns `None` when the capture is exhausted,
    /// at which point decoders flush whatever partial frame they hold.
    pub fn wait(&mut self, conds: &[Cond]) -> Option<WaitMatch> {
        let len = self.capture.len();

        let mut pos = self.next;
        while pos < len {
            let mut matched = 0u32;

            for (i, cond) in conds.iter().enumerate() {
                let hit = match *cond {
                    Cond::Low(ch) => !self.capture.level(pos, ch),
                    Cond::High(ch) => self.capture.level(pos, ch),
                    Cond::Rising(ch) => {
                        pos > 0
                            && !self.capture.level(pos - 1, ch)
                            && self.capture.level(pos, ch)
                    }
                    Cond::Falling(ch) => {
                        pos > 0
                            && self.capture.level(pos - 1, ch)
                            && !self.capture.level(pos, ch)
                    }
                    Cond::Edge(ch) => {
                        pos > 0 && self.capture.level(pos - 1, ch) != self.capture.level(pos, ch)
                    }
                    Cond::Skip(n) => pos + 1 >= self.next + n.max(1),
                };

                if hit {
                    matched |= 1 << i;
                }
            }

            if matched != 0 {
                self.next = pos + 1;
                return Some(WaitMatch {
                    pos,
                    sample: self.capture.sample(pos),
                    matched,
                });
            }

            pos += 1;
        }

        self.next = len;
        None
    }

    /// Moves the cursor so the next wait starts scanning at `pos`.
    pub fn seek(&mut self, pos: SamplePosition) {
        self.next = pos;
    }
}

#[cfg(test)]
fn capture_of(channel_bits: &[u8]) -> Capture {
    Capture::new(channel_bits.to_vec(), Some(1_000_000.0))
}

#[test]
fn wait_level_and_edge() {
    // Channel 0: 1 1 0 0 1
    let cap = capture_of(&[1, 1, 0, 0, 1]);
    let mut cur = Cursor::new(&cap);

    let m = cur.wait(&[Cond::Falling(0)]).unwrap();
    assert_eq!(m.pos, 2);
    assert!(m.matched(0));

    let m = cur.wait(&[Cond::Rising(0)]).unwrap();
    assert_eq!(m.pos, 4);

    assert!(cur.wait(&[Cond::Edge(0)]).is_none());
}

#[test]
fn wait_no_edge_at_first_sample() {
    let cap = capture_of(&[1, 1, 1]);
    let mut cur = Cursor::new(&cap);

    assert!(cur.wait(&[Cond::Edge(0)]).is_none());
}

#[test]
fn wait_level_matches_immediately() {
    let cap = capture_of(&[0, 0, 1]);
    let mut cur = Cursor::new(&cap);

    let m = cur.wait(&[Cond::Low(0)]).unwrap();
    assert_eq!(m.pos, 0);

    // Next wait begins at the following sample.
    let m = cur.wait(&[Cond::Low(0)]).unwrap();
    assert_eq!(m.pos, 1);
}

#[test]
fn wait_skip_counts_from_next() {
    let cap = capture_of(&[0; 10]);
    let mut cur = Cursor::new(&cap);

    let m = cur.wait(&[Cond::Skip(3)]).unwrap();
    assert_eq!(m.pos, 2);

    let m = cur.wait(&[Cond::Skip(3)]).unwrap();
    assert_eq!(m.pos, 5);

    // Zero clamps to one sample of progress.
    let m = cur.wait(&[Cond::Skip(0)]).unwrap();
    assert_eq!(m.pos, 6);
}

#[test]
fn wait_reports_which_term_matched() {
    // Channel 1: 0 0 1, channel 0 stays low.
    let cap = capture_of(&[0, 0, 2]);
    let mut cur = Cursor::new(&cap);

    let m = cur.wait(&[Cond::Rising(0), Cond::Rising(1)]).unwrap();
    assert_eq!(m.pos, 2);
    assert!(!m.matched(0));
    assert!(m.matched(1));
    assert!(m.level(1));
}

#[test]
fn wait_exhausted_capture() {
    let cap = capture_of(&[]);
    let mut cur = Cursor::new(&cap);

    assert!(cur.wait(&[Cond::Skip(1)]).is_none());
}
