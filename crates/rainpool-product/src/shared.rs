//! Thread-safe handle to a [`RainProduct`]
//!
//! Every operation runs under one lock, so each call is atomic with respect
//! to all others.

use parking_lot::{Mutex, MutexGuard};
use std::sync::Arc;

use crate::product::RainProduct;

#[derive(Clone)]
pub struct SharedProduct {
    inner: Arc<Mutex<RainProduct>>,
}

impl SharedProduct {
    pub fn new(product: RainProduct) -> Self {
        Self {
            inner: Arc::new(Mutex::new(product)),
        }
    }

    /// Run `f` with exclusive access to the product
    pub fn with<R>(&self, f: impl FnOnce(&mut RainProduct) -> R) -> R {
        f(&mut self.inner.lock())
    }

    pub fn lock(&self) -> MutexGuard<'_, RainProduct> {
        self.inner.lock()
    }
}
