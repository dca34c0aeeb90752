use std::str::Utf8Error;
use std::sync::Arc;

use yrs::block::ClientID;
use yrs::encoding::read::{Error, Read};
use yrs::updates::decoder::Decoder;
use yrs::{Any, ID};

/// lib0 v1 decoder for bytes that came off a socket.
///
/// Behaves like `yrs::updates::decoder::DecoderV1` except that every string
/// is checked for valid UTF-8 before yrs sees it. The stock decoder trusts
/// its input, so a single mangled byte in a client frame would otherwise
/// become an invalid `&str` inside the document store.
#[derive(Clone)]
pub struct CheckedDecoder<'a> {
    buf: &'a [u8],
    next: usize,
    invalid_utf8: Option<Utf8Error>,
}

impl<'a> CheckedDecoder<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self {
            buf,
            next: 0,
            invalid_utf8: None,
        }
    }

    /// Bytes not consumed yet.
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.next
    }

    /// The UTF-8 error that aborted decoding, if that is what happened.
    pub fn invalid_utf8(&self) -> Option<Utf8Error> {
        self.invalid_utf8
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], Error> {
        let end = self
            .next
            .checked_add(len)
            .filter(|end| *end <= self.buf.len())
            .ok_or(Error::EndOfBuffer(len))?;
        let slice = &self.buf[self.next..end];
        self.next = end;
        Ok(slice)
    }

    fn read_id(&mut self) -> Result<ID, Error> {
        let client: u32 = self.read_var()?;
        let clock: u32 = self.read_var()?;
        Ok(ID::new(client as ClientID, clock))
    }
}

impl<'a> Read for CheckedDecoder<'a> {
    fn read_exact(&mut self, len: usize) -> Result<&[u8], Error> {
        self.take(len)
    }

    fn read_u8(&mut self) -> Result<u8, Error> {
        Ok(self.take(1)?[0])
    }

    fn read_string(&mut self) -> Result<&str, Error> {
        let len: u32 = self.read_var()?;
        let bytes = self.take(len as usize)?;
        std::str::from_utf8(bytes).map_err(|e| {
            self.invalid_utf8 = Some(e);
            Error::Custom(format!("string is not valid UTF-8: {e}"))
        })
    }
}

impl<'a> Decoder for CheckedDecoder<'a> {
    fn reset_ds_cur_val(&mut self) {}

    fn read_ds_clock(&mut self) -> Result<u32, Error> {
        self.read_var()
    }

    fn read_ds_len(&mut self) -> Result<u32, Error> {
        self.read_var()
    }

    fn read_left_id(&mut self) -> Result<ID, Error> {
        self.read_id()
    }

    fn read_right_id(&mut self) -> Result<ID, Error> {
        self.read_id()
    }

    fn read_client(&mut self) -> Result<ClientID, Error> {
        let client: u32 = self.read_var()?;
        Ok(client as ClientID)
    }

    fn read_info(&mut self) -> Result<u8, Error> {
        self.read_u8()
    }

    fn read_parent_info(&mut self) -> Result<bool, Error> {
        let info: u32 = self.read_var()?;
        Ok(info == 1)
    }

    fn read_type_ref(&mut self) -> Result<u8, Error> {
        self.read_u8()
    }

    fn read_len(&mut self) -> Result<u32, Error> {
        self.read_var()
    }

    // Nested values decode through `self`, so their strings are checked too.
    fn read_any(&mut self) -> Result<Any, Error> {
        Any::decode(self)
    }

    fn read_json(&mut self) -> Result<Any, Error> {
        let src = self.read_string()?;
        Any::from_json(src)
    }

    fn read_key(&mut self) -> Result<Arc<str>, Error> {
        Ok(self.read_string()?.into())
    }

    fn read_to_end(&mut self) -> Result<&[u8], Error> {
        Ok(&self.buf[self.next..])
    }
}
