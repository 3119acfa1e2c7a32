//! Domain types shared by the storage traits and their backends.

mod client;
mod consent;
mod group;
mod request;

pub use client::{AUTH_METHOD_NONE, Client};
pub use consent::{
    AuthenticationRequest, AuthenticationSession, ConsentRequest, ConsentRequestSessionData,
    ForcedObfuscatedAuthenticationSession, HandledAuthenticationRequest, HandledConsentRequest,
    OpenIdConnectContext, RequestDeniedError,
};
pub use group::Group;
pub use request::{DefaultSession, Request, Session, SessionLookup};

/// Window over a result list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub limit: usize,
    pub offset: usize,
}

impl Pagination {
    #[must_use]
    pub fn new(limit: usize, offset: usize) -> Self {
        Self { limit, offset }
    }

    /// Returns the slice of `items` covered by this window.
    ///
    /// An offset past the end yields an empty list.
    #[must_use]
    pub fn apply<T>(&self, items: Vec<T>) -> Vec<T> {
        items.into_iter().skip(self.offset).take(self.limit).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pagination_window() {
        let items: Vec<u32> = (0..10).collect();
        assert_eq!(Pagination::new(3, 2).apply(items.clone()), vec![2, 3, 4]);
        assert_eq!(Pagination::new(5, 8).apply(items.clone()), vec![8, 9]);
        assert!(Pagination::new(5, 20).apply(items).is_empty());
    }
}
