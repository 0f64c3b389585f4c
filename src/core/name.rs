//! Content names.
//!
//! A name is a routable IP prefix plus a 32-bit suffix. For RTC streams the
//! suffix carries the segment (sequence) number, so one base name with a
//! varying suffix addresses every segment of the stream.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

use super::error::NameError;

/// Separator between prefix and suffix in the textual form (`b001::1|42`).
pub const SUFFIX_SEPARATOR: char = '|';

/// A content name: IP prefix plus 32-bit suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Name {
    prefix: IpAddr,
    suffix: u32,
}

impl Name {
    /// Create a name from a prefix and a suffix.
    pub fn new(prefix: IpAddr, suffix: u32) -> Self {
        Self { prefix, suffix }
    }

    /// The routable prefix.
    pub fn prefix(&self) -> IpAddr {
        self.prefix
    }

    /// The suffix (segment number).
    pub fn suffix(&self) -> u32 {
        self.suffix
    }

    /// Replace the suffix in place.
    pub fn set_suffix(&mut self, suffix: u32) {
        self.suffix = suffix;
    }

    /// Copy of this name with a different suffix.
    pub fn with_suffix(self, suffix: u32) -> Self {
        Self { suffix, ..self }
    }

    /// Whether the prefix is an IPv6 address.
    pub fn is_ipv6(&self) -> bool {
        self.prefix.is_ipv6()
    }

    /// Prefix as four 32-bit words, the layout used by manifests.
    ///
    /// IPv4 prefixes occupy the first word; the rest is zero.
    pub fn prefix_words(&self) -> [u32; 4] {
        match self.prefix {
            IpAddr::V4(v4) => [u32::from(v4), 0, 0, 0],
            IpAddr::V6(v6) => {
                let bits = u128::from(v6);
                [
                    (bits >> 96) as u32,
                    (bits >> 64) as u32,
                    (bits >> 32) as u32,
                    bits as u32,
                ]
            }
        }
    }

    /// Rebuild a prefix from its four-word form.
    pub fn from_prefix_words(words: [u32; 4], is_ipv6: bool, suffix: u32) -> Self {
        let prefix = if is_ipv6 {
            let bits = (u128::from(words[0]) << 96)
                | (u128::from(words[1]) << 64)
                | (u128::from(words[2]) << 32)
                | u128::from(words[3]);
            IpAddr::V6(Ipv6Addr::from(bits))
        } else {
            IpAddr::V4(Ipv4Addr::from(words[0]))
        };
        Self { prefix, suffix }
    }
}

impl Default for Name {
    fn default() -> Self {
        Self::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), 0)
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.prefix, SUFFIX_SEPARATOR, self.suffix)
    }
}

impl FromStr for Name {
    type Err = NameError;

    /// Parse `prefix` or `prefix|suffix`; a missing suffix means 0.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (prefix, suffix) = match s.split_once(SUFFIX_SEPARATOR) {
            Some((prefix, suffix)) => (prefix, Some(suffix)),
            None => (s, None),
        };

        let prefix = prefix
            .trim()
            .parse::<IpAddr>()
            .map_err(|_| NameError::InvalidPrefix(prefix.to_string()))?;

        let suffix = match suffix {
            Some(raw) => raw
                .trim()
                .parse::<u32>()
                .map_err(|_| NameError::InvalidSuffix(raw.to_string()))?,
            None => 0,
        };

        Ok(Self { prefix, suffix })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_with_suffix() {
        let name: Name = "b001::123|321".parse().unwrap();
        assert_eq!(name.prefix(), "b001::123".parse::<IpAddr>().unwrap());
        assert_eq!(name.suffix(), 321);
        assert!(name.is_ipv6());
        assert_eq!(name.to_string(), "b001::123|321");
    }

    #[test]
    fn test_parse_without_suffix() {
        let name: Name = "10.0.0.1".parse().unwrap();
        assert_eq!(name.suffix(), 0);
        assert!(!name.is_ipv6());
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            "not-an-ip|1".parse::<Name>(),
            Err(NameError::InvalidPrefix(_))
        ));
        assert!(matches!(
            "b001::|abc".parse::<Name>(),
            Err(NameError::InvalidSuffix(_))
        ));
    }

    #[test]
    fn test_prefix_words_v6() {
        let name: Name = "b001::dead".parse().unwrap();
        let words = name.prefix_words();
        assert_eq!(words, [0xb001_0000, 0, 0, 0x0000_dead]);

        let back = Name::from_prefix_words(words, true, 7);
        assert_eq!(back.prefix(), name.prefix());
        assert_eq!(back.suffix(), 7);
    }

    #[test]
    fn test_prefix_words_v4() {
        let name: Name = "192.168.1.2|5".parse().unwrap();
        let words = name.prefix_words();
        assert_eq!(words, [0xc0a8_0102, 0, 0, 0]);
        assert_eq!(Name::from_prefix_words(words, false, 5), name);
    }

    #[test]
    fn test_with_suffix() {
        let mut name: Name = "b001::".parse().unwrap();
        assert_eq!(name.with_suffix(9).suffix(), 9);
        name.set_suffix(11);
        assert_eq!(name.suffix(), 11);
    }
}
