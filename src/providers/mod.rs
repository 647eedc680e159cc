// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Custodia

//! External payment-provider integrations.

pub mod paystack;

pub use paystack::{PaystackClient, PaystackError, SIGNATURE_HEADER};
