use rocket::{FromForm, UriDisplayQuery};
use serde::{Deserialize, Serialize};

/// Page selection, taken from query parameters.
#[derive(Debug, Clone, Copy, FromForm, UriDisplayQuery)]
pub struct PaginationRequest {
    #[field(default = 1)]
    pub page_num: u32,
    #[field(default = 50)]
    pub page_size: u32,
}

impl PaginationRequest {
    pub fn skip(&self) -> u32 {
        self.page_num.saturating_sub(1) * self.page_size
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    pub fn to_paginated<T>(self, total: u64, items: Vec<T>) -> Paginated<T> {
        Paginated {
            items,
            pagination: PaginationInfo {
                page_num: self.page_num,
                page_size: self.page_size,
                total,
            },
        }
    }
}

/// One page of results plus the paging context it was cut from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Paginated<T> {
    pub items: Vec<T>,
    pub pagination: PaginationInfo,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PaginationInfo {
    pub page_num: u32,
    pub page_size: u32,
    pub total: u64,
}
