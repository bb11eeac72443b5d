//! Request encoding.
//!
//! A request is `[u32 total length excluding this field][u32 name length]
//! [function name][per-function fields]`, all integers big-endian, every
//! length excluding its own 4-byte prefix. The standard prologue after the
//! function name is userid, password, and target identifier, each as a
//! length-prefixed string.

/// Builder for one encoded request.
///
/// The encode side is the simple mirror of the table-driven decoder: each
/// per-API function appends its fixed and variable fields in wire order
/// and calls [`encode`].
///
/// [`encode`]: Request::encode
///
/// # Example
///
/// ```
/// use smapi_wire::Request;
///
/// let bytes = Request::new("Image_Activate")
///     .string("MAINT")
///     .string("secret")
///     .string("LINUX01")
///     .encode();
/// assert_eq!(&bytes[8..22], b"Image_Activate");
/// ```
#[derive(Debug, Clone)]
#[must_use = "a Request does nothing until .encode() is called"]
pub struct Request {
    /// Function name sent ahead of the fields.
    name: String,
    /// Encoded per-function fields, in append order.
    body: Vec<u8>,
}

impl Request {
    /// Starts a request for the named API function.
    pub fn new(function: impl Into<String>) -> Self {
        Self {
            name: function.into(),
            body: Vec::new(),
        }
    }

    /// Appends a length-prefixed string field.
    pub fn string(mut self, s: &str) -> Self {
        #[allow(clippy::cast_possible_truncation)]
        let len = s.len() as u32;
        self.body.extend_from_slice(&len.to_be_bytes());
        self.body.extend_from_slice(s.as_bytes());
        self
    }

    /// Appends a NUL-terminated string field.
    pub fn cstr(mut self, s: &str) -> Self {
        self.body.extend_from_slice(s.as_bytes());
        self.body.push(0);
        self
    }

    /// Appends a 1-byte integer field.
    pub fn int1(mut self, v: u8) -> Self {
        self.body.push(v);
        self
    }

    /// Appends a 4-byte integer field.
    pub fn int4(mut self, v: u32) -> Self {
        self.body.extend_from_slice(&v.to_be_bytes());
        self
    }

    /// Appends an 8-byte integer field.
    pub fn int8(mut self, v: u64) -> Self {
        self.body.extend_from_slice(&v.to_be_bytes());
        self
    }

    /// Appends fixed-width bytes verbatim (no length prefix).
    pub fn chars(mut self, b: &[u8]) -> Self {
        self.body.extend_from_slice(b);
        self
    }

    /// Produces the final wire bytes, total-length prefix included.
    pub fn encode(self) -> Vec<u8> {
        let total = 4 + self.name.len() + self.body.len();
        let mut out = Vec::with_capacity(4 + total);
        #[allow(clippy::cast_possible_truncation)]
        out.extend_from_slice(&(total as u32).to_be_bytes());
        #[allow(clippy::cast_possible_truncation)]
        out.extend_from_slice(&(self.name.len() as u32).to_be_bytes());
        out.extend_from_slice(self.name.as_bytes());
        out.extend_from_slice(&self.body);
        out
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn golden_bytes_for_authenticated_request() {
        let bytes = Request::new("Query_API_Functional_Level")
            .string("MAINT")
            .string("pw")
            .string("LINUX01")
            .encode();

        let name = b"Query_API_Functional_Level";
        // total excludes its own 4-byte prefix.
        let expected_total = 4 + name.len() + (4 + 5) + (4 + 2) + (4 + 7);
        let total = u32::from_be_bytes(bytes[0..4].try_into().unwrap()) as usize;
        assert_eq!(total, expected_total);
        assert_eq!(bytes.len(), total + 4);

        let name_len = u32::from_be_bytes(bytes[4..8].try_into().unwrap()) as usize;
        assert_eq!(name_len, name.len());
        assert_eq!(&bytes[8..8 + name.len()], name);

        let after = 8 + name.len();
        let userid_len = u32::from_be_bytes(bytes[after..after + 4].try_into().unwrap());
        assert_eq!(userid_len, 5);
        assert_eq!(&bytes[after + 4..after + 9], b"MAINT");
    }

    #[test]
    fn scalar_fields_encode_big_endian() {
        let bytes = Request::new("X").int1(7).int4(0x0102_0304).int8(1).encode();
        let body = &bytes[4 + 4 + 1..];
        assert_eq!(body[0], 7);
        assert_eq!(body[1..5], [1, 2, 3, 4]);
        assert_eq!(body[5..13], [0, 0, 0, 0, 0, 0, 0, 1]);
    }

    #[test]
    fn cstr_and_chars_fields() {
        let bytes = Request::new("X").cstr("ab").chars(&[0xFF; 2]).encode();
        let body = &bytes[9..];
        assert_eq!(body, [b'a', b'b', 0, 0xFF, 0xFF]);
    }
}
