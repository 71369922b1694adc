/// Build the mirror table name from the configured prefix and the
/// module's plural name. Both parts are split into words on `_` and
/// whitespace, each word is capitalized, and the words are glued back
/// together: (`zoho_`, `Leads`) becomes `ZohoLeads`.
pub fn table_name(prefix: &str, module: &str) -> String {
    let mut out = String::new();
    for part in [prefix, module] {
        for word in part.split(|c: char| c == '_' || c.is_whitespace()) {
            let mut chars = word.chars();
            if let Some(first) = chars.next() {
                out.extend(first.to_uppercase());
                out.push_str(&chars.as_str().to_lowercase());
            }
        }
    }
    out
}
