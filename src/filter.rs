// Keyword filtering applied at read time

use crate::connection::ConnectionView;

/// Keep the connections where any searchable field contains `keyword`,
/// ignoring case. An empty keyword keeps everything in its original order.
pub fn filter_connections<'a, I>(views: I, keyword: &str) -> Vec<&'a ConnectionView>
where
    I: IntoIterator<Item = &'a ConnectionView>,
{
    if keyword.is_empty() {
        return views.into_iter().collect();
    }

    let needle = keyword.to_lowercase();
    views
        .into_iter()
        .filter(|view| matches_keyword(view, &needle))
        .collect()
}

/// `needle` must already be lowercase
fn matches_keyword(view: &ConnectionView, needle: &str) -> bool {
    view.searchable_fields()
        .iter()
        .any(|field| field.to_lowercase().contains(needle))
}
