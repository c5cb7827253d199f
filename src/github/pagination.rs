use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::de::DeserializeOwned;

use crate::errors::{Error, Result};
use crate::services::{ListingService, PageRequest};

/// Lazily enumerate every record reachable from `first`, one page request at a time.
///
/// A page is only requested once the consumer has drained the previous one, so dropping the
/// stream early stops further requests. The stream cannot be restarted.
pub fn paginate<'a, S, T>(service: &'a S, first: PageRequest) -> BoxStream<'a, Result<T>>
where
    S: ListingService + ?Sized,
    T: DeserializeOwned + Send + 'a,
{
    stream::try_unfold(Some(first), move |request| async move {
        let Some(request) = request else {
            return Ok(None);
        };
        tracing::debug!("fetching page {}", request.url);
        let page = service.fetch_page(&request).await?;
        let records = page
            .records
            .into_iter()
            .map(serde_json::from_value::<T>)
            .collect::<std::result::Result<Vec<T>, _>>()?;
        let next = page.next.map(PageRequest::next);
        let records = stream::iter(records.into_iter().map(Ok::<T, Error>));
        Ok::<_, Error>(Some((records, next)))
    })
    .try_flatten()
    .boxed()
}

/// Extract the `rel="next"` target from an RFC 8288 `Link` header.
pub fn next_link(header: &str) -> Option<String> {
    static RE: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r#"^\s*<([^>]*)>\s*;(?:.*;)?\s*rel\s*=\s*"?next"?\s*(?:;.*)?$"#)
            .expect("link pattern is valid")
    });

    header
        .split(',')
        .filter_map(|link| RE.captures(link))
        .find_map(|c| c.get(1).map(|m| m.as_str().to_string()))
}
