// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Page requests and results for task and run history listings.

use serde::{Deserialize, Serialize};

pub const DEFAULT_PER_PAGE: u32 = 20;
pub const MAX_PER_PAGE: u32 = 100;

/// A 1-based page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
	pub page: u32,
	pub per_page: u32,
}

impl PageRequest {
	/// Clamp `page` to at least 1 and `per_page` into `[1, MAX_PER_PAGE]`.
	pub fn new(page: u32, per_page: u32) -> Self {
		Self {
			page: page.max(1),
			per_page: per_page.clamp(1, MAX_PER_PAGE),
		}
	}

	pub fn limit(&self) -> i64 {
		i64::from(self.per_page)
	}

	pub fn offset(&self) -> i64 {
		i64::from(self.page.saturating_sub(1)) * i64::from(self.per_page)
	}
}

impl Default for PageRequest {
	fn default() -> Self {
		Self::new(1, DEFAULT_PER_PAGE)
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
	pub items: Vec<T>,
	pub total: u64,
	pub page: u32,
	pub per_page: u32,
}

impl<T> Page<T> {
	pub fn new(items: Vec<T>, total: u64, request: PageRequest) -> Self {
		Self {
			items,
			total,
			page: request.page,
			per_page: request.per_page,
		}
	}

	pub fn total_pages(&self) -> u64 {
		self.total.div_ceil(u64::from(self.per_page.max(1)))
	}

	pub fn has_next(&self) -> bool {
		u64::from(self.page) < self.total_pages()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_page_request_defaults() {
		let request = PageRequest::default();
		assert_eq!(request.page, 1);
		assert_eq!(request.per_page, 20);
		assert_eq!(request.offset(), 0);
	}

	#[test]
	fn test_page_request_clamping() {
		let request = PageRequest::new(0, 500);
		assert_eq!(request.page, 1);
		assert_eq!(request.per_page, 100);

		let request = PageRequest::new(3, 0);
		assert_eq!(request.per_page, 1);
		assert_eq!(request.offset(), 2);
	}

	#[test]
	fn test_page_request_offset() {
		assert_eq!(PageRequest::new(3, 25).offset(), 50);
		assert_eq!(PageRequest::new(3, 25).limit(), 25);
	}

	#[test]
	fn test_total_pages() {
		let page: Page<()> = Page::new(vec![], 0, PageRequest::default());
		assert_eq!(page.total_pages(), 0);
		assert!(!page.has_next());

		let page: Page<()> = Page::new(vec![], 41, PageRequest::new(2, 20));
		assert_eq!(page.total_pages(), 3);
		assert!(page.has_next());

		let page: Page<()> = Page::new(vec![], 40, PageRequest::new(2, 20));
		assert_eq!(page.total_pages(), 2);
		assert!(!page.has_next());
	}
}
