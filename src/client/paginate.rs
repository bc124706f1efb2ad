//! Pagination driver.
//!
//! Turns any paged list RPC into either a gather-all call or a lazy
//! stream. The cursor is opaque: it is echoed back to the server
//! verbatim and never interpreted here.

use async_stream::try_stream;
use futures::Stream;
use serde::de::DeserializeOwned;
use serde_json::{ json, Value };
use tokio_util::sync::CancellationToken;

use crate::errors::Error;
use crate::protocol::{
    Cursor,
    ListPromptsResult,
    ListResourceTemplatesResult,
    ListResourcesResult,
    ListToolsResult,
    Prompt,
    Resource,
    ResourceTemplate,
    Tool,
};
use crate::session::Session;

/// One page of a paginated list result: items plus the cursor for the
/// next page, absent on the final page.
pub trait PagedResult: DeserializeOwned {
    type Item;

    /// Split the page into its items and the next-page cursor.
    fn into_parts(self) -> (Vec<Self::Item>, Option<Cursor>);
}

impl PagedResult for ListToolsResult {
    type Item = Tool;

    fn into_parts(self) -> (Vec<Tool>, Option<Cursor>) {
        (self.tools, self.next_cursor)
    }
}

impl PagedResult for ListPromptsResult {
    type Item = Prompt;

    fn into_parts(self) -> (Vec<Prompt>, Option<Cursor>) {
        (self.prompts, self.next_cursor)
    }
}

impl PagedResult for ListResourcesResult {
    type Item = Resource;

    fn into_parts(self) -> (Vec<Resource>, Option<Cursor>) {
        (self.resources, self.next_cursor)
    }
}

impl PagedResult for ListResourceTemplatesResult {
    type Item = ResourceTemplate;

    fn into_parts(self) -> (Vec<ResourceTemplate>, Option<Cursor>) {
        (self.resource_templates, self.next_cursor)
    }
}

/// Params for one page request: `{cursor}` after the first page, no
/// params at all before it.
pub(crate) fn page_params(cursor: &Option<Cursor>) -> Option<Value> {
    cursor.as_ref().map(|cursor| json!({ "cursor": cursor }))
}

/// Fetch every page of `method`, concatenating items in page order.
///
/// A failing page aborts with its error; already-fetched items are
/// discarded.
pub(crate) async fn collect_all<P: PagedResult>(
    session: &Session,
    method: &'static str,
    ctx: &CancellationToken
) -> Result<Vec<P::Item>, Error> {
    let mut items = Vec::new();
    let mut cursor: Option<Cursor> = None;
    loop {
        let page: P = session.request(method, page_params(&cursor), ctx).await?;
        let (page_items, next_cursor) = page.into_parts();
        items.extend(page_items);
        match next_cursor {
            Some(next) => {
                cursor = Some(next);
            }
            None => {
                break;
            }
        }
    }
    Ok(items)
}

/// Lazily yield every item of `method`, requesting pages as the consumer
/// advances.
///
/// The stream is finite and not restartable: every call issues fresh
/// page-one requests. Consumers wanting caching must materialize.
/// Dropping the stream, or cancelling `ctx`, aborts the in-flight page
/// request.
pub(crate) fn stream_all<'a, P>(
    session: &'a Session,
    method: &'static str,
    ctx: CancellationToken
) -> impl Stream<Item = Result<P::Item, Error>> + 'a
    where P: PagedResult + 'a, P::Item: 'a
{
    try_stream! {
        let mut cursor: Option<Cursor> = None;
        loop {
            let page: P = session.request(method, page_params(&cursor), &ctx).await?;
            let (page_items, next_cursor) = page.into_parts();
            for item in page_items {
                yield item;
            }
            match next_cursor {
                Some(next) => {
                    cursor = Some(next);
                }
                None => {
                    break;
                }
            }
        }
    }
}
