//! # STS Text Framing
//!
//! The login tier speaks an HTTP-like text protocol:
//!
//! ```text
//! POST /Auth/LoginStart STS/1.0\r\n
//! l:84\r\n
//! s:2\r\n
//! \r\n
//! <84 bytes of body>
//! ```
//!
//! `l` is the body length in bytes and `s` an opaque sequence token that the
//! server echoes back with an `R` suffix:
//!
//! ```text
//! STS/1.0 200 OK\r\nl:<len>\r\ns:<seq>R\r\n\r\n<body>
//! STS/1.0 <code> <reason>\r\ns:<seq>R\r\n\r\n
//! ```
//!
//! Parsing never consumes partially: an incomplete buffer is handed back
//! untouched and the caller retries once more bytes arrive.

use crate::framing::FramingError;
use nom::{
    bytes::complete::{tag, take_till, take_till1, take_while1},
    character::complete::char,
    combinator::all_consuming,
    multi::many0,
    sequence::{preceded, separated_pair, tuple},
    IResult,
};

/// Protocol/version string used by every request and response
pub const STS_PROTOCOL: &str = "STS/1.0";

/// Default cap on head + body size for one request
pub const DEFAULT_MAX_REQUEST_LEN: usize = 0x10000;

const HEAD_TERMINATOR: &[u8] = b"\r\n\r\n";

/// A complete STS request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StsRequest {
    pub method: String,
    pub uri: String,
    pub protocol: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl StsRequest {
    /// Build a request (used by clients and tests)
    pub fn new(method: &str, uri: &str, sequence: Option<&str>, body: impl Into<Vec<u8>>) -> Self {
        let body = body.into();
        let mut headers = vec![("l".to_string(), body.len().to_string())];
        if let Some(seq) = sequence {
            headers.push(("s".to_string(), seq.to_string()));
        }

        Self {
            method: method.to_string(),
            uri: uri.to_string(),
            protocol: STS_PROTOCOL.to_string(),
            headers,
            body,
        }
    }

    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// The `s` sequence token, if the client sent one
    pub fn sequence(&self) -> Option<&str> {
        self.header("s")
    }

    pub fn body_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.body).ok()
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = format!("{} {} {}\r\n", self.method, self.uri, self.protocol).into_bytes();
        for (key, value) in &self.headers {
            out.extend_from_slice(format!("{}:{}\r\n", key, value).as_bytes());
        }
        out.extend_from_slice(b"\r\n");
        out.extend_from_slice(&self.body);
        out
    }
}

/// A complete STS response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StsResponse {
    pub status: u16,
    pub reason: String,
    /// Request sequence token, without the trailing `R`
    pub sequence: Option<String>,
    pub body: Vec<u8>,
}

impl StsResponse {
    pub fn ok(sequence: Option<&str>, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status: 200,
            reason: "OK".to_string(),
            sequence: sequence.map(str::to_string),
            body: body.into(),
        }
    }

    pub fn error(sequence: Option<&str>, status: u16) -> Self {
        Self {
            status,
            reason: reason_phrase(status).to_string(),
            sequence: sequence.map(str::to_string),
            body: Vec::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == 200
    }

    pub fn body_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.body).ok()
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = format!("{} {} {}\r\n", STS_PROTOCOL, self.status, self.reason).into_bytes();

        if self.is_success() {
            out.extend_from_slice(format!("l:{}\r\n", self.body.len()).as_bytes());
        }
        if let Some(seq) = &self.sequence {
            out.extend_from_slice(format!("s:{}R\r\n", seq).as_bytes());
        }
        out.extend_from_slice(b"\r\n");

        if self.is_success() {
            out.extend_from_slice(&self.body);
        }
        out
    }
}

/// Reason phrase for the status codes the server emits
pub fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        400 => "Bad Request",
        401 => "Unauthorized",
        404 => "Not Found",
        500 => "Internal Server Error",
        _ => "Error",
    }
}

/// Result of parsing a buffer that may hold a partial message
#[derive(Debug, PartialEq, Eq)]
pub enum ParseOutcome<'a, T> {
    /// One message plus whatever bytes followed it
    Complete { message: T, rest: &'a [u8] },
    /// Not enough bytes yet; the original buffer, unchanged
    Incomplete(&'a [u8]),
}

fn token(input: &str) -> IResult<&str, &str> {
    take_till1(|c| c == ' ' || c == '\r' || c == '\n')(input)
}

fn request_line(input: &str) -> IResult<&str, (&str, &str, &str)> {
    tuple((token, preceded(char(' '), token), preceded(char(' '), token)))(input)
}

fn status_line(input: &str) -> IResult<&str, (&str, &str, &str)> {
    tuple((
        token,
        preceded(char(' '), take_while1(|c: char| c.is_ascii_digit())),
        preceded(char(' '), take_till(|c| c == '\r' || c == '\n')),
    ))(input)
}

fn header_line(input: &str) -> IResult<&str, (&str, &str)> {
    preceded(
        tag("\r\n"),
        separated_pair(
            take_till1(|c| c == ':' || c == '\r' || c == '\n'),
            char(':'),
            take_till(|c| c == '\r' || c == '\n'),
        ),
    )(input)
}

type Head<'a> = ((&'a str, &'a str, &'a str), Vec<(&'a str, &'a str)>);

fn parse_head<'a>(
    head: &'a [u8],
    start_line: fn(&'a str) -> IResult<&'a str, (&'a str, &'a str, &'a str)>,
) -> Result<Head<'a>, FramingError> {
    let head = std::str::from_utf8(head)
        .map_err(|_| FramingError::InvalidFormat("message head is not UTF-8".into()))?;

    let (_, parsed) = all_consuming(tuple((start_line, many0(header_line))))(head)
        .map_err(|_| FramingError::InvalidFormat(format!("malformed message head: {:?}", head)))?;

    Ok(parsed)
}

fn find_head_end(buf: &[u8]) -> Option<usize> {
    buf.windows(HEAD_TERMINATOR.len())
        .position(|window| window == HEAD_TERMINATOR)
}

fn body_length(headers: &[(&str, &str)]) -> Result<usize, FramingError> {
    match headers.iter().find(|(k, _)| k.trim() == "l") {
        Some((_, value)) => value
            .trim()
            .parse()
            .map_err(|_| FramingError::InvalidFormat(format!("invalid body length: {:?}", value))),
        None => Ok(0),
    }
}

/// Shared head/body splitting for requests and responses
fn parse_message<'a, T>(
    buf: &'a [u8],
    max_len: usize,
    start_line: fn(&str) -> IResult<&str, (&str, &str, &str)>,
    build: impl FnOnce((&str, &str, &str), &[(&str, &str)], Vec<u8>) -> Result<T, FramingError>,
) -> Result<ParseOutcome<'a, T>, FramingError> {
    let head_end = match find_head_end(buf) {
        Some(pos) => pos,
        None => {
            if buf.len() > max_len {
                return Err(FramingError::InvalidFormat(format!(
                    "message head exceeds {} bytes",
                    max_len
                )));
            }
            return Ok(ParseOutcome::Incomplete(buf));
        }
    };

    let (start, headers) = parse_head(&buf[..head_end], start_line)?;
    let body_len = body_length(&headers)?;

    let body_start = head_end + HEAD_TERMINATOR.len();
    let total = body_start
        .checked_add(body_len)
        .ok_or_else(|| FramingError::InvalidFormat(format!("body length {} overflows", body_len)))?;
    if total > max_len {
        return Err(FramingError::InvalidFormat(format!(
            "message of {} bytes exceeds {} bytes",
            total, max_len
        )));
    }

    if buf.len() < total {
        return Ok(ParseOutcome::Incomplete(buf));
    }

    let body = buf[body_start..total].to_vec();
    let message = build(start, &headers, body)?;

    Ok(ParseOutcome::Complete {
        message,
        rest: &buf[total..],
    })
}

/// Parse one request from the front of `buf`
pub fn parse_request(buf: &[u8], max_len: usize) -> Result<ParseOutcome<'_, StsRequest>, FramingError> {
    parse_message(buf, max_len, request_line, |(method, uri, protocol), headers, body| {
        Ok(StsRequest {
            method: method.to_string(),
            uri: uri.to_string(),
            protocol: protocol.to_string(),
            headers: headers
                .iter()
                .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
                .collect(),
            body,
        })
    })
}

/// Parse one response from the front of `buf` (client side)
pub fn parse_response(buf: &[u8], max_len: usize) -> Result<ParseOutcome<'_, StsResponse>, FramingError> {
    parse_message(buf, max_len, status_line, |(_, status, reason), headers, body| {
        let status = status
            .parse()
            .map_err(|_| FramingError::InvalidFormat(format!("invalid status: {:?}", status)))?;

        let sequence = headers
            .iter()
            .find(|(k, _)| k.trim() == "s")
            .map(|(_, v)| v.trim().trim_end_matches('R').to_string());

        Ok(StsResponse {
            status,
            reason: reason.to_string(),
            sequence,
            body,
        })
    })
}
