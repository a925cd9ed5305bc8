use std::collections::BTreeMap;

use csv::ReaderBuilder;
use tracing::*;

/// Splits free text into whitespace-separated tokens, honouring double
/// quotes.
pub fn tokenize(text: &str) -> Vec<String> {
    let mut reader = ReaderBuilder::new()
        .delimiter(b' ')
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());

    let mut tokens = vec![];
    for record in reader.records() {
        match record {
            Ok(record) => tokens.extend(record.iter().filter(|t| !t.is_empty()).map(str::to_owned)),
            Err(e) => {
                warn!("could not split {text:?} into tokens: {e}");
                return text.split_whitespace().map(str::to_owned).collect();
            }
        }
    }
    tokens
}

/// Name and `key=value` properties from the text that trails a structure.
pub fn split_name_and_properties(text: &str) -> (String, BTreeMap<String, String>) {
    let mut name = vec![];
    let mut properties = BTreeMap::new();
    for token in tokenize(&text.replace('\t', " ")) {
        match token.split_once('=') {
            Some((key, value)) if !key.is_empty() => {
                trace!("property {key} = {value}");
                properties.insert(key.to_owned(), value.to_owned());
            }
            _ => name.push(token),
        }
    }
    (name.join(" "), properties)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_and_properties() {
        let (name, props) = split_name_and_properties("benzene ring  source=pubchem \"note=has spaces\"");
        assert_eq!(name, "benzene ring");
        assert_eq!(props["source"], "pubchem");
        assert_eq!(props["note"], "has spaces");
    }

    #[test]
    fn test_empty() {
        let (name, props) = split_name_and_properties("   ");
        assert!(name.is_empty());
        assert!(props.is_empty());
    }
}
