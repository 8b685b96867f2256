// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

pub mod crawl_worker_test;
pub mod frontier_bus_test;
pub mod redis_backend_test;
pub mod static_fetcher_test;
