//! Per-request state shared by every handler tried for a request.

use hyper::header::{HeaderName, HeaderValue};
use hyper::{Body, HeaderMap, Request, Response, StatusCode};

/// The status and headers of the response being prepared for a request.
#[derive(Debug, Clone)]
pub struct ResponseHead {
    pub status: StatusCode,
    pub headers: HeaderMap,
}

impl Default for ResponseHead {
    fn default() -> Self {
        Self {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
        }
    }
}

impl ResponseHead {
    pub fn insert_header(&mut self, name: HeaderName, value: HeaderValue) {
        self.headers.insert(name, value);
    }

    /// Finishes the response with `body`.
    pub fn finish(self, body: Body) -> Response<Body> {
        let mut response = Response::new(body);
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }

    /// Copies the headers set on this head into a response produced
    /// elsewhere, replacing headers of the same name.
    pub fn apply(self, response: &mut Response<Body>) {
        let headers = response.headers_mut();
        let mut last = None;
        for (name, value) in self.headers {
            match name {
                Some(name) => {
                    headers.insert(name.clone(), value);
                    last = Some(name);
                }
                None => {
                    if let Some(name) = &last {
                        headers.append(name.clone(), value);
                    }
                }
            }
        }
    }
}

/// The user authenticated while dispatching, attached to the request's
/// extensions when the request passes through the router.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser(pub String);

/// The state of a single request while it is being dispatched.
///
/// The dispatcher owns the context and lends it to each handler in turn, so
/// a handler observes changes made by the handlers tried before it, such as
/// the user authenticated by the built-in token path.
#[derive(Debug)]
pub struct RequestContext {
    request: Request<Body>,
    response: ResponseHead,
    user_id: Option<String>,
}

impl RequestContext {
    pub fn new(request: Request<Body>) -> Self {
        Self {
            request,
            response: ResponseHead::default(),
            user_id: None,
        }
    }

    pub fn request(&self) -> &Request<Body> {
        &self.request
    }

    pub fn request_mut(&mut self) -> &mut Request<Body> {
        &mut self.request
    }

    pub fn response(&self) -> &ResponseHead {
        &self.response
    }

    pub fn response_mut(&mut self) -> &mut ResponseHead {
        &mut self.response
    }

    /// The user authenticated for this request, if any.
    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    pub fn set_user_id(&mut self, user_id: impl Into<String>) {
        self.user_id = Some(user_id.into());
    }

    /// Splits the context into the request and the pending response head.
    /// The authenticated user, if any, is stored in the request's extensions
    /// as [`AuthenticatedUser`].
    pub fn into_parts(mut self) -> (Request<Body>, ResponseHead) {
        if let Some(user_id) = self.user_id.take() {
            self.request.extensions_mut().insert(AuthenticatedUser(user_id));
        }
        (self.request, self.response)
    }
}
