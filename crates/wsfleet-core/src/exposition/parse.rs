use std::fmt;

use crate::error::{FleetError, Result};

/// `# TYPE` of a metric family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricType {
    Counter,
    Gauge,
    Histogram,
    Summary,
    Untyped,
}

impl MetricType {
    pub fn as_str(self) -> &'static str {
        match self {
            MetricType::Counter => "counter",
            MetricType::Gauge => "gauge",
            MetricType::Histogram => "histogram",
            MetricType::Summary => "summary",
            MetricType::Untyped => "untyped",
        }
    }

    fn from_token(s: &str) -> Option<Self> {
        match s {
            "counter" => Some(MetricType::Counter),
            "gauge" => Some(MetricType::Gauge),
            "histogram" => Some(MetricType::Histogram),
            "summary" => Some(MetricType::Summary),
            "untyped" => Some(MetricType::Untyped),
            _ => None,
        }
    }

    /// Suffixes a sample name may carry while still belonging to the family.
    fn suffixes(self) -> &'static [&'static str] {
        match self {
            MetricType::Histogram => &["_bucket", "_sum", "_count"],
            MetricType::Summary => &["_sum", "_count"],
            _ => &[],
        }
    }
}

impl fmt::Display for MetricType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One `name{labels} value` line.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub name: String,
    pub labels: Vec<(String, String)>,
    pub value: f64,
}

impl Sample {
    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// A `# TYPE`'d metric family with its samples.
#[derive(Debug, Clone, PartialEq)]
pub struct Family {
    pub name: String,
    pub kind: MetricType,
    pub help: Option<String>,
    pub samples: Vec<Sample>,
}

impl Family {
    fn new(name: &str, kind: MetricType) -> Self {
        Self {
            name: name.to_string(),
            kind,
            help: None,
            samples: Vec::new(),
        }
    }

    fn owns(&self, sample_name: &str) -> bool {
        if sample_name == self.name {
            return true;
        }
        sample_name
            .strip_prefix(self.name.as_str())
            .is_some_and(|rest| self.kind.suffixes().contains(&rest))
    }
}

/// Parsed scrape body.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Exposition {
    pub families: Vec<Family>,
}

impl Exposition {
    pub fn family(&self, name: &str) -> Option<&Family> {
        self.families.iter().find(|f| f.name == name)
    }

    pub fn samples(&self) -> impl Iterator<Item = &Sample> {
        self.families.iter().flat_map(|f| f.samples.iter())
    }

    /// Value of the first sample named `sample_name`.
    pub fn value(&self, sample_name: &str) -> Option<f64> {
        self.samples()
            .find(|s| s.name == sample_name)
            .map(|s| s.value)
    }

    /// Sum over every label set of `sample_name` in this scrape.
    pub fn sum(&self, sample_name: &str) -> f64 {
        self.samples()
            .filter(|s| s.name == sample_name)
            .map(|s| s.value)
            .sum()
    }
}

/// Parse exposition text into families.
///
/// Accepts `# HELP`, `# TYPE`, other comments, blank lines and sample lines
/// with an optional trailing timestamp. Samples that appear without a
/// preceding `# TYPE` form an untyped family.
pub fn parse(text: &str) -> Result<Exposition> {
    let mut out = Exposition::default();
    let mut help: Vec<(String, String)> = Vec::new();

    for (idx, raw) in text.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(rest) = line.strip_prefix('#') {
            let mut parts = rest.trim_start().splitn(3, ' ');
            match (parts.next(), parts.next(), parts.next()) {
                (Some("TYPE"), Some(name), Some(kind)) => {
                    validate_name(name, line_no)?;
                    let kind = MetricType::from_token(kind.trim())
                        .ok_or_else(|| err(line_no, format!("unknown metric type {kind:?}")))?;
                    if out.family(name).is_some() {
                        return Err(err(line_no, format!("duplicate TYPE for {name}")));
                    }
                    out.families.push(Family::new(name, kind));
                }
                (Some("HELP"), Some(name), doc) => {
                    validate_name(name, line_no)?;
                    help.push((name.to_string(), unescape_help(doc.unwrap_or(""))));
                }
                _ => {}
            }
            continue;
        }

        let sample = parse_sample(line, line_no)?;
        match out.families.iter_mut().rev().find(|f| f.owns(&sample.name)) {
            Some(family) => family.samples.push(sample),
            None => {
                let mut family = Family::new(&sample.name, MetricType::Untyped);
                family.samples.push(sample);
                out.families.push(family);
            }
        }
    }

    for (name, doc) in help {
        if let Some(f) = out.families.iter_mut().find(|f| f.name == name) {
            f.help = Some(doc);
        }
    }

    Ok(out)
}

fn err(line: usize, msg: String) -> FleetError {
    FleetError::Exposition { line, msg }
}

fn is_name_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_' || c == ':'
}

fn is_name_char(c: char) -> bool {
    is_name_start(c) || c.is_ascii_digit()
}

fn validate_name(name: &str, line: usize) -> Result<()> {
    let mut chars = name.chars();
    let ok = chars.next().is_some_and(is_name_start) && chars.all(is_name_char);
    if ok {
        Ok(())
    } else {
        Err(err(line, format!("invalid metric name {name:?}")))
    }
}

fn parse_sample(line: &str, line_no: usize) -> Result<Sample> {
    let name_end = line
        .find(|c: char| !is_name_char(c))
        .unwrap_or(line.len());
    let name = &line[..name_end];
    validate_name(name, line_no)?;

    let mut rest = &line[name_end..];
    let mut labels = Vec::new();
    if let Some(body) = rest.strip_prefix('{') {
        let (parsed, after) = parse_labels(body, line_no)?;
        labels = parsed;
        rest = after;
    }

    let mut fields = rest.split_whitespace();
    let value = fields
        .next()
        .ok_or_else(|| err(line_no, format!("missing value for {name}")))?;
    let value = parse_value(value).ok_or_else(|| err(line_no, format!("bad value {value:?}")))?;
    if let Some(ts) = fields.next() {
        ts.parse::<i64>()
            .map_err(|_| err(line_no, format!("bad timestamp {ts:?}")))?;
    }
    if fields.next().is_some() {
        return Err(err(line_no, "trailing garbage".into()));
    }

    Ok(Sample {
        name: name.to_string(),
        labels,
        value,
    })
}

/// Parse `k="v",k2="v2"}` and return the labels plus the remainder after `}`.
fn parse_labels(mut s: &str, line_no: usize) -> Result<(Vec<(String, String)>, &str)> {
    let mut labels = Vec::new();
    loop {
        s = s.trim_start();
        if let Some(after) = s.strip_prefix('}') {
            return Ok((labels, after));
        }

        let eq = s
            .find('=')
            .ok_or_else(|| err(line_no, "label without '='".into()))?;
        let key = s[..eq].trim();
        validate_name(key, line_no)?;
        s = s[eq + 1..]
            .trim_start()
            .strip_prefix('"')
            .ok_or_else(|| err(line_no, format!("label {key} value must be quoted")))?;

        let mut value = String::new();
        let mut chars = s.char_indices();
        let close = loop {
            match chars.next() {
                Some((i, '"')) => break i,
                Some((_, '\\')) => match chars.next() {
                    Some((_, 'n')) => value.push('\n'),
                    Some((_, c)) => value.push(c),
                    None => return Err(err(line_no, "dangling escape".into())),
                },
                Some((_, c)) => value.push(c),
                None => return Err(err(line_no, format!("unterminated value for {key}"))),
            }
        };
        labels.push((key.to_string(), value));

        s = s[close + 1..].trim_start();
        if let Some(after) = s.strip_prefix(',') {
            s = after;
        } else if !s.starts_with('}') {
            return Err(err(line_no, "expected ',' or '}' after label".into()));
        }
    }
}

fn parse_value(s: &str) -> Option<f64> {
    match s {
        "+Inf" | "Inf" => Some(f64::INFINITY),
        "-Inf" => Some(f64::NEG_INFINITY),
        "NaN" => Some(f64::NAN),
        _ => s.parse().ok(),
    }
}

/// Single pass, so an escaped backslash never pairs with the following char.
fn unescape_help(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('\\') => out.push('\\'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn unescapes_label_values() {
        let exp = parse("x{path=\"a\\\"b\\\\c\\nd\"} 1\n").unwrap();
        let s = exp.samples().next().unwrap();
        assert_eq!(s.label("path"), Some("a\"b\\c\nd"));
    }

    #[test]
    fn help_escapes_are_read_left_to_right() {
        let exp = parse("# HELP p path C:\\\\new\\nline\n# TYPE p gauge\np 1\n").unwrap();
        assert_eq!(
            exp.family("p").unwrap().help.as_deref(),
            Some("path C:\\new\nline")
        );
    }

    #[test]
    fn rejects_unquoted_label() {
        assert!(parse("x{a=b} 1").is_err());
    }

    #[test]
    fn accepts_timestamp() {
        let exp = parse("up 1 1700000000000").unwrap();
        assert_eq!(exp.value("up"), Some(1.0));
    }
}
