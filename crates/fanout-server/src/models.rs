// SPDX-FileCopyrightText: Fanout Hub Team <hub@fanouthub.dev>
//
// SPDX-License-Identifier: Apache-2.0

//! Simplified DTOs mirroring the REST backend's entities.
//!
//! These are event payloads only — the REST service is the source of truth
//! for the actual entities (§1); the fan-out service never reads or writes
//! them, it just carries them inside a [`crate::notify::Notification`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id_order: i64,
    pub order_date: DateTime<Utc>,
    pub status: String,
    pub total_amount: f64,
    pub delivery_type: String,
    pub id_client: i64,
    pub id_cart: i64,
    pub id_payment_method: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_delivery: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    pub id_product: i64,
    pub id_seller: i64,
    pub id_inventory: i64,
    pub id_category: i64,
    pub id_sub_category: i64,
    pub product_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    pub price: f64,
    pub stock: i64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub image_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Category {
    pub id_category: i64,
    pub category_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub photo: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubCategory {
    pub id_sub_category: i64,
    pub id_category: i64,
    pub sub_category_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cart {
    pub id_cart: i64,
    pub id_client: i64,
    pub status: String,
    pub id_product: i64,
    pub quantity: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Delivery {
    pub id_delivery: i64,
    pub id_product: i64,
    pub delivery_address: String,
    pub city: String,
    pub status: String,
    pub estimated_time: DateTime<Utc>,
    pub delivery_person: String,
    pub delivery_cost: f64,
    pub phone: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentMethod {
    pub id_payment_method: i64,
    pub method_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub details_payment: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Seller {
    pub id_seller: i64,
    pub seller_name: String,
    pub seller_email: String,
    pub phone: i64,
    pub bussines_name: String,
    pub location: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Client {
    pub id_client: i64,
    pub client_name: String,
    pub client_email: String,
    pub address: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub phone: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub document_type: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub document_number: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub birth_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub avatar_url: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Admin {
    pub id_admin: i64,
    pub admin_name: String,
    pub admin_email: String,
    pub role: String,
    pub created_at: DateTime<Utc>,
}
