//! Named routes addressed by dotted names such as `reports.salesPDF`.

use crate::context::RequestContext;
use crate::router::HandlerResult;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use serde_json::Value;

/// A handler reachable by name through the router's named route path.
///
/// Implemented for closures taking the request context and the positional
/// arguments decoded from the URL:
/// ```rust
/// use tokenroute::{Outcome, RouteNode};
///
/// let routes = RouteNode::namespace().with(
///     "greet",
///     RouteNode::route(|_, args| {
///         Box::pin(async move {
///             let name = args.get(0).and_then(|v| v.as_str()).unwrap_or("world").to_owned();
///             Ok(Outcome::body(format!("Hello, {}", name)))
///         })
///     }),
/// );
/// # let _ = routes;
/// ```
pub trait Route: Send + Sync {
    fn call<'a>(&'a self, cx: &'a mut RequestContext, args: Vec<Value>) -> BoxFuture<'a, HandlerResult>;
}

impl<F> Route for F
where
    F: for<'a> Fn(&'a mut RequestContext, Vec<Value>) -> BoxFuture<'a, HandlerResult> + Send + Sync,
{
    fn call<'a>(&'a self, cx: &'a mut RequestContext, args: Vec<Value>) -> BoxFuture<'a, HandlerResult> {
        self(cx, args)
    }
}

/// A node of a route tree: either a leaf value or a namespace of named
/// children.
///
/// The server keeps handlers in its leaves; a client mirror may keep any
/// placeholder, since only the shape of the tree matters there.
#[derive(Clone, PartialEq, Eq)]
pub enum RouteNode<T> {
    Leaf(T),
    Namespace(BTreeMap<String, RouteNode<T>>),
}

impl<T: fmt::Debug> fmt::Debug for RouteNode<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouteNode::Leaf(value) => f.debug_tuple("Leaf").field(value).finish(),
            RouteNode::Namespace(children) => f.debug_map().entries(children.iter()).finish(),
        }
    }
}

impl<T> Default for RouteNode<T> {
    fn default() -> Self {
        RouteNode::Namespace(BTreeMap::new())
    }
}

impl RouteNode<Arc<dyn Route>> {
    /// Wraps a handler closure in a leaf.
    pub fn route<F>(handler: F) -> Self
    where
        F: for<'a> Fn(&'a mut RequestContext, Vec<Value>) -> BoxFuture<'a, HandlerResult>
            + Send
            + Sync
            + 'static,
    {
        RouteNode::Leaf(Arc::new(handler))
    }
}

impl<T> RouteNode<T> {
    /// An empty namespace.
    pub fn namespace() -> Self {
        Self::default()
    }

    pub fn leaf(value: T) -> Self {
        RouteNode::Leaf(value)
    }

    /// Adds a child under `name`, replacing any existing child of that name.
    /// A leaf becomes an empty namespace first.
    pub fn with(mut self, name: impl Into<String>, child: RouteNode<T>) -> Self {
        self.children_mut().insert(name.into(), child);
        self
    }

    /// Inserts `value` at a dotted path, creating namespaces along the way.
    pub fn insert(&mut self, dotted: &str, value: T) {
        let mut node = self;
        let mut segments = dotted.split('.').peekable();
        while let Some(segment) = segments.next() {
            let children = node.children_mut();
            if segments.peek().is_none() {
                children.insert(segment.to_owned(), RouteNode::Leaf(value));
                return;
            }
            node = children
                .entry(segment.to_owned())
                .or_insert_with(RouteNode::namespace);
        }
    }

    fn children_mut(&mut self) -> &mut BTreeMap<String, RouteNode<T>> {
        if let RouteNode::Leaf(_) = self {
            *self = RouteNode::namespace();
        }
        match self {
            RouteNode::Namespace(children) => children,
            RouteNode::Leaf(_) => unreachable!("leaf replaced by a namespace above"),
        }
    }

    /// Merges `other` into this tree. Namespaces merge key by key; on any
    /// other collision the node from `other` wins.
    pub fn merge(&mut self, other: RouteNode<T>) {
        match (self, other) {
            (RouteNode::Namespace(mine), RouteNode::Namespace(theirs)) => {
                for (name, node) in theirs {
                    match mine.get_mut(&name) {
                        Some(existing) => existing.merge(node),
                        None => {
                            mine.insert(name, node);
                        }
                    }
                }
            }
            (this, other) => *this = other,
        }
    }

    /// Resolves a dotted name to a leaf. Every segment must name a child of
    /// the namespace reached so far, and the last one must be a leaf.
    pub fn get(&self, dotted: &str) -> Option<&T> {
        if dotted.is_empty() {
            return None;
        }
        let mut node = self;
        for segment in dotted.split('.') {
            node = match node {
                RouteNode::Namespace(children) => children.get(segment)?,
                RouteNode::Leaf(_) => return None,
            };
        }
        match node {
            RouteNode::Leaf(value) => Some(value),
            RouteNode::Namespace(_) => None,
        }
    }

    /// Builds a tree of the same shape, mapping each leaf with its dotted name.
    pub fn map<U>(&self, mut f: impl FnMut(&str, &T) -> U) -> RouteNode<U> {
        self.map_inner(&mut String::new(), &mut f)
    }

    fn map_inner<U>(&self, prefix: &mut String, f: &mut impl FnMut(&str, &T) -> U) -> RouteNode<U> {
        match self {
            RouteNode::Leaf(value) => RouteNode::Leaf(f(prefix, value)),
            RouteNode::Namespace(children) => {
                let mut mapped = BTreeMap::new();
                for (name, child) in children {
                    let len = prefix.len();
                    if !prefix.is_empty() {
                        prefix.push('.');
                    }
                    prefix.push_str(name);
                    mapped.insert(name.clone(), child.map_inner(prefix, f));
                    prefix.truncate(len);
                }
                RouteNode::Namespace(mapped)
            }
        }
    }

    /// The dotted names of every leaf, in name order.
    pub fn names(&self) -> Vec<String> {
        let mut names = Vec::new();
        self.collect_names(&mut String::new(), &mut names);
        names
    }

    fn collect_names(&self, prefix: &mut String, names: &mut Vec<String>) {
        match self {
            RouteNode::Leaf(_) => names.push(prefix.clone()),
            RouteNode::Namespace(children) => {
                for (name, child) in children {
                    let len = prefix.len();
                    if !prefix.is_empty() {
                        prefix.push('.');
                    }
                    prefix.push_str(name);
                    child.collect_names(prefix, names);
                    prefix.truncate(len);
                }
            }
        }
    }
}

/// The named routes known to a router.
#[derive(Default)]
pub struct RouteTable {
    root: RouteNode<Arc<dyn Route>>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merges a tree of routes into the table.
    pub fn add_routes(&mut self, routes: RouteNode<Arc<dyn Route>>) {
        self.root.merge(routes);
    }

    /// Looks up a route by dotted name. An unknown name is not an error.
    pub fn lookup(&self, dotted: &str) -> Option<Arc<dyn Route>> {
        self.root.get(dotted).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.root.names()
    }
}

impl fmt::Debug for RouteTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteTable")
            .field("routes", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree(pairs: &[(&str, i32)]) -> RouteNode<i32> {
        let mut node = RouteNode::namespace();
        for (name, value) in pairs {
            node.insert(name, *value);
        }
        node
    }

    #[test]
    fn merge_keeps_siblings() {
        let mut routes = tree(&[("a.b", 1)]);
        routes.merge(tree(&[("a.c", 2)]));

        assert_eq!(routes.get("a.b"), Some(&1));
        assert_eq!(routes.get("a.c"), Some(&2));
    }

    #[test]
    fn merge_last_writer_wins() {
        let mut routes = tree(&[("a.b", 1)]);
        routes.merge(tree(&[("a.b", 2)]));
        assert_eq!(routes.get("a.b"), Some(&2));

        routes.merge(tree(&[("a", 3)]));
        assert_eq!(routes.get("a"), Some(&3));
        assert_eq!(routes.get("a.b"), None);
    }

    #[test]
    fn lookup_never_partially_matches() {
        let routes = tree(&[("reports.salesPDF", 1), ("home", 2)]);

        assert_eq!(routes.get("reports.salesPDF"), Some(&1));
        assert_eq!(routes.get("home"), Some(&2));
        assert_eq!(routes.get("reports"), None);
        assert_eq!(routes.get("reports.salesPDF.extra"), None);
        assert_eq!(routes.get("home.extra"), None);
        assert_eq!(routes.get("reports.missing"), None);
        assert_eq!(routes.get(""), None);
        assert_eq!(routes.get("reports."), None);
    }

    #[test]
    fn with_builds_nested_namespaces() {
        let routes = RouteNode::namespace()
            .with("a", RouteNode::namespace().with("b", RouteNode::leaf(1)))
            .with("c", RouteNode::leaf(2));

        assert_eq!(routes.get("a.b"), Some(&1));
        assert_eq!(routes.names(), vec!["a.b".to_owned(), "c".to_owned()]);
    }

    #[test]
    fn names_list_every_leaf() {
        let routes = tree(&[("reports.sales.pdf", 1), ("reports.csv", 2), ("home", 3)]);
        assert_eq!(
            routes.names(),
            vec!["home".to_owned(), "reports.csv".to_owned(), "reports.sales.pdf".to_owned()]
        );
        assert!(RouteNode::<u8>::namespace().names().is_empty());
    }

    #[test]
    fn map_passes_dotted_names() {
        let routes = tree(&[("a.b", 1), ("c", 2)]);
        let mapped = routes.map(|name, value| format!("{}={}", name, value));

        assert_eq!(mapped.get("a.b").map(String::as_str), Some("a.b=1"));
        assert_eq!(mapped.get("c").map(String::as_str), Some("c=2"));
    }
}
