mod admin_queries;
mod helpers;
mod mocks;
mod vendor_views;
