//! Incremental splitter for a concatenation of JSON arrays
//!
//! Input arrives in arbitrary chunks. The scanner tracks just enough
//! lexical state (string, escape, bracket nesting) to find where each
//! top-level array element starts and ends, and hands every complete
//! element's bytes to a callback. Only one element is buffered at a time.
//!
//! Values outside an array are skipped. A `[` found while skipping an
//! object opens an array like any other, so `{"items":[1,2]}` yields the
//! two items.

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Outside any array, skipping values until `[`
    Between,
    /// Just after `[`, expecting an element or `]`
    ArrayOpen,
    /// After `,`, expecting an element
    AfterComma,
    /// Inside an element
    Element,
}

#[derive(Debug)]
pub(crate) struct ArrayScanner {
    state: State,
    element: Vec<u8>,
    nesting: Vec<u8>,
    skipped_objects: usize,
    in_string: bool,
    escaped: bool,
    offset: u64,
    arrays: usize,
}

impl ArrayScanner {
    pub(crate) fn new() -> Self {
        Self {
            state: State::Between,
            element: Vec::new(),
            nesting: Vec::new(),
            skipped_objects: 0,
            in_string: false,
            escaped: false,
            offset: 0,
            arrays: 0,
        }
    }

    /// Number of arrays opened so far
    pub(crate) fn arrays(&self) -> usize {
        self.arrays
    }

    /// Scan `chunk`, calling `on_element` with the raw bytes of every completed element
    pub(crate) fn feed(
        &mut self,
        chunk: &[u8],
        mut on_element: impl FnMut(&[u8]) -> Result<()>,
    ) -> Result<()> {
        for &b in chunk {
            self.step(b, &mut on_element)?;
            self.offset += 1;
        }
        Ok(())
    }

    /// Signal end of input
    pub(crate) fn finish(&self) -> Result<()> {
        match self.state {
            State::Between if !self.in_string && self.skipped_objects == 0 => Ok(()),
            State::Between => Err(Error::decode(format!(
                "unexpected end of stream inside a value at byte {}",
                self.offset
            ))),
            _ => Err(Error::decode(format!(
                "unexpected end of stream inside array {} at byte {}",
                self.arrays, self.offset
            ))),
        }
    }

    fn step(&mut self, b: u8, on_element: &mut impl FnMut(&[u8]) -> Result<()>) -> Result<()> {
        match self.state {
            State::Between => self.skip_byte(b)?,
            State::ArrayOpen => match b {
                b']' => self.state = State::Between,
                b',' => return Err(self.unexpected(b, "expected array element")),
                b if b.is_ascii_whitespace() => {}
                other => self.begin_element(other)?,
            },
            State::AfterComma => match b {
                b']' | b',' => return Err(self.unexpected(b, "expected array element")),
                b if b.is_ascii_whitespace() => {}
                other => self.begin_element(other)?,
            },
            State::Element => self.element_byte(b, on_element)?,
        }
        Ok(())
    }

    fn skip_byte(&mut self, b: u8) -> Result<()> {
        if self.in_string {
            if self.escaped {
                self.escaped = false;
            } else if b == b'\\' {
                self.escaped = true;
            } else if b == b'"' {
                self.in_string = false;
            }
            return Ok(());
        }

        match b {
            b'[' => {
                self.arrays += 1;
                self.state = State::ArrayOpen;
            }
            b'{' => self.skipped_objects += 1,
            b'}' if self.skipped_objects > 0 => self.skipped_objects -= 1,
            b'"' => self.in_string = true,
            b':' | b',' | b'-' | b'+' | b'.' => {}
            b if b.is_ascii_whitespace() || b.is_ascii_alphanumeric() => {}
            other => return Err(self.unexpected(other, "expected a JSON value")),
        }
        Ok(())
    }

    fn begin_element(&mut self, b: u8) -> Result<()> {
        self.element.clear();
        self.nesting.clear();
        self.in_string = false;
        self.escaped = false;
        self.state = State::Element;
        // First byte can never close the element, so no callback is needed.
        self.element_byte(b, &mut |_: &[u8]| -> Result<()> { Ok(()) })
    }

    fn element_byte(
        &mut self,
        b: u8,
        on_element: &mut impl FnMut(&[u8]) -> Result<()>,
    ) -> Result<()> {
        if self.in_string {
            self.element.push(b);
            if self.escaped {
                self.escaped = false;
            } else if b == b'\\' {
                self.escaped = true;
            } else if b == b'"' {
                self.in_string = false;
            }
            return Ok(());
        }

        match b {
            b'"' => {
                self.in_string = true;
                self.element.push(b);
            }
            b'{' | b'[' => {
                self.nesting.push(b);
                self.element.push(b);
            }
            b'}' | b']' if !self.nesting.is_empty() => {
                let open = self.nesting.pop();
                let expected = if b == b'}' { b'{' } else { b'[' };
                if open != Some(expected) {
                    return Err(self.unexpected(b, "mismatched bracket"));
                }
                self.element.push(b);
            }
            b',' if self.nesting.is_empty() => {
                on_element(&self.element)?;
                self.state = State::AfterComma;
            }
            b']' => {
                on_element(&self.element)?;
                self.state = State::Between;
            }
            b'}' => return Err(self.unexpected(b, "unbalanced '}'")),
            _ => self.element.push(b),
        }
        Ok(())
    }

    fn unexpected(&self, b: u8, what: &str) -> Error {
        Error::decode(format!(
            "{what}, found '{}' at byte {}",
            char::from(b).escape_default(),
            self.offset
        ))
    }
}
