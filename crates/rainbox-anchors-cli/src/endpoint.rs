use std::sync::OnceLock;

use anyhow::{Context, Result, bail};
use rainbox_anchors::Endpoint;
use regex::Regex;

/// Parse `path:offset`, path being dot separated child indexes from the
/// container (empty for the container itself), e.g. `0.2:5` or `:1`
pub fn parse_endpoint(input: &str) -> Result<Endpoint> {
    static ENDPOINT_REGEX: OnceLock<Regex> = OnceLock::new();
    let regex = ENDPOINT_REGEX.get_or_init(|| {
        Regex::new(r"^(?P<path>\d+(?:\.\d+)*)?:(?P<offset>\d+)$").expect("Invalid endpoint regex")
    });

    let Some(caps) = regex.captures(input.trim()) else {
        bail!("invalid boundary '{input}', expected PATH:OFFSET such as 0.1:4");
    };
    let path = match caps.name("path") {
        Some(path) => path
            .as_str()
            .split('.')
            .map(|step| step.parse::<usize>())
            .collect::<Result<Vec<_>, _>>()
            .with_context(|| format!("path step out of range in '{input}'"))?,
        None => Vec::new(),
    };
    let offset = caps["offset"]
        .parse()
        .with_context(|| format!("offset out of range in '{input}'"))?;
    Ok(Endpoint::new(path, offset))
}

/// Inverse of [`parse_endpoint`], for listing
pub fn format_endpoint(endpoint: &Endpoint) -> String {
    let path: Vec<String> = endpoint.path.iter().map(ToString::to_string).collect();
    format!("{}:{}", path.join("."), endpoint.offset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[rstest]
    #[case::text_node("0.0:6", vec![0, 0], 6)]
    #[case::deep("1.2.0.3:12", vec![1, 2, 0, 3], 12)]
    #[case::container(":2", vec![], 2)]
    #[case::padded("  0:1 ", vec![0], 1)]
    fn test_parse_endpoint(#[case] input: &str, #[case] path: Vec<usize>, #[case] offset: usize) {
        let endpoint = parse_endpoint(input).unwrap();

        assert_eq!(endpoint, Endpoint::new(path, offset));
    }

    #[rstest]
    #[case::missing_offset("0.0")]
    #[case::empty_step("0..1:2")]
    #[case::negative("0:-1")]
    #[case::letters("a:1")]
    fn test_parse_endpoint_rejects(#[case] input: &str) {
        assert!(parse_endpoint(input).is_err());
    }

    #[test]
    fn test_format_endpoint() {
        assert_eq!(format_endpoint(&Endpoint::new(vec![0, 3], 7)), "0.3:7");
        assert_eq!(format_endpoint(&Endpoint::new(vec![], 1)), ":1");
    }
}
