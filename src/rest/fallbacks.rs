//! Fallbacks turn selected failures into values

use crate::error::{Error, Result};

pub trait Fallback<T>: Send + Sync {
    fn create_or_propagate(&self, error: Error) -> Result<T>;
}

/// `None` for a missing resource
pub struct NullOnNotFoundOr404;

impl<T> Fallback<Option<T>> for NullOnNotFoundOr404 {
    fn create_or_propagate(&self, error: Error) -> Result<Option<T>> {
        if error.is_not_found() {
            return Ok(None);
        }
        Err(error)
    }
}

pub struct FalseOnNotFoundOr404;

impl Fallback<bool> for FalseOnNotFoundOr404 {
    fn create_or_propagate(&self, error: Error) -> Result<bool> {
        if error.is_not_found() {
            return Ok(false);
        }
        Err(error)
    }
}

/// Deleting something already gone succeeds
pub struct TrueOnNotFoundOr404;

impl Fallback<bool> for TrueOnNotFoundOr404 {
    fn create_or_propagate(&self, error: Error) -> Result<bool> {
        if error.is_not_found() {
            return Ok(true);
        }
        Err(error)
    }
}

pub struct VoidOnNotFoundOr404;

impl Fallback<()> for VoidOnNotFoundOr404 {
    fn create_or_propagate(&self, error: Error) -> Result<()> {
        if error.is_not_found() {
            return Ok(());
        }
        Err(error)
    }
}

pub struct EmptyListOnNotFoundOr404;

impl<T> Fallback<Vec<T>> for EmptyListOnNotFoundOr404 {
    fn create_or_propagate(&self, error: Error) -> Result<Vec<T>> {
        if error.is_not_found() {
            return Ok(Vec::new());
        }
        Err(error)
    }
}
