use crate::models::Sender;

const UNKNOWN_SENDER: &str = "Unknown";

/// Splits a "From" header into display name and address.
///
/// - `Name <addr>`: the bracketed part is the address, the unquoted text
///   before `<` the name (the address stands in when that text is empty).
/// - a bare header containing `@` is both name and address.
/// - anything else is a name with no address.
/// - a missing or blank header is `Unknown` with no address.
pub fn parse_sender(from_header: Option<&str>) -> Sender {
    let header = from_header.map(str::trim).unwrap_or_default();
    if header.is_empty() {
        return Sender {
            name: UNKNOWN_SENDER.to_string(),
            address: String::new(),
        };
    }

    if let Some(start) = header.find('<') {
        if let Some(len) = header[start + 1..].find('>') {
            let address = header[start + 1..start + 1 + len].trim().to_string();
            let name = strip_quotes(&header[..start]);
            let name = if name.is_empty() { address.clone() } else { name };
            return Sender { name, address };
        }
    }

    if header.contains('@') {
        return Sender {
            name: header.to_string(),
            address: header.to_string(),
        };
    }

    Sender {
        name: strip_quotes(header),
        address: String::new(),
    }
}

fn strip_quotes(text: &str) -> String {
    // Apostrophes only count as quotes at the edges ("O'Brien" keeps its own).
    text.replace('"', "")
        .trim()
        .trim_matches('\'')
        .trim()
        .to_string()
}
