//! Endpoint handlers served by the fixture.
//!
//! - `echo`: writes every message back verbatim
//! - `ping`: answers `ping<n>` with `n` pongs
//! - `close`: closes the session on `close[:code[:reason]]`

pub mod close;
pub mod echo;
pub mod ping;

pub use close::CloseOnRequest;
pub use echo::Echo;
pub use ping::Ping;

/// Parse a leading base-10 integer, ignoring anything after the digits.
///
/// Accepts leading whitespace and an optional sign. Returns `None` when no
/// digits are found. Values beyond `i64` saturate.
pub(crate) fn parse_int_prefix(input: &str) -> Option<i64> {
    let s = input.trim_start();
    let (negative, digits) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };

    let len = digits.bytes().take_while(u8::is_ascii_digit).count();
    if len == 0 {
        return None;
    }

    let magnitude = digits[..len].bytes().fold(0i64, |acc, b| {
        acc.saturating_mul(10).saturating_add(i64::from(b - b'0'))
    });
    Some(if negative { -magnitude } else { magnitude })
}
