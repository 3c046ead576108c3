//! # Usage & Overage
//!
//! SMS/email quota records and the pricing of monthly usage invoices.
//!
//! ## Overage Invariant
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  per channel, at every moment:                                          │
//! │                                                                         │
//! │    overage_charge == max(0, sent_this_month − package_size) × rate      │
//! │                                                                         │
//! │  package 100, rate 1.00, 120 sent  ⇒  20 over  ⇒  20.00                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The charge is recomputed from the counter on every send, never
//! accumulated, so a lost update cannot make the two drift apart.
//!
//! ## Invoice Lines
//! ```text
//! overage      units_over × rate        (only when > 0)
//! package fee  sms_package_price        (only when > 0)
//! ─────────────────────────────────────────────────────
//! subtotal → VAT (billing.vat_rate) → total
//! ```

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use ts_rs::TS;

use crate::money::{Money, Rate};
use crate::period::PaymentPeriod;

// =============================================================================
// Channel
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum MessageChannel {
    Sms,
    Email,
}

impl MessageChannel {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageChannel::Sms => "sms",
            MessageChannel::Email => "email",
        }
    }

    /// Invoice number prefix (`SMS-…`, `EML-…`).
    pub fn invoice_prefix(&self) -> &'static str {
        match self {
            MessageChannel::Sms => "SMS",
            MessageChannel::Email => "EML",
        }
    }
}

impl fmt::Display for MessageChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Tenant Usage
// =============================================================================

/// Per-tenant usage counters and package settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TenantUsage {
    pub tenant_id: String,
    pub tenant_name: String,
    pub is_active: bool,

    pub sms_package_active: bool,
    pub sms_package_size: i64,
    /// Monthly package fee.
    pub sms_package_price: Money,
    pub sms_sent_this_month: i64,
    pub sms_overage_rate: Money,
    pub sms_overage_charge: Money,

    pub email_monthly_limit: i64,
    pub emails_sent_this_month: i64,
    pub email_overage_rate: Money,
    pub email_overage_charge: Money,

    #[ts(as = "Option<String>")]
    pub current_month_start: Option<NaiveDate>,
}

/// One channel's slice of [`TenantUsage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ChannelUsage {
    pub channel: MessageChannel,
    /// SMS only; email is always metered.
    pub package_active: bool,
    pub package_size: i64,
    pub package_price: Money,
    pub sent: i64,
    pub overage_rate: Money,
    pub overage_charge: Money,
}

impl ChannelUsage {
    pub fn units_over(&self) -> i64 {
        units_over(self.sent, self.package_size)
    }

    /// Whether the stored charge agrees with the counter.
    pub fn is_consistent(&self) -> bool {
        self.overage_charge == overage_charge(self.sent, self.package_size, self.overage_rate)
    }
}

impl TenantUsage {
    pub fn channel(&self, channel: MessageChannel) -> ChannelUsage {
        match channel {
            MessageChannel::Sms => ChannelUsage {
                channel,
                package_active: self.sms_package_active,
                package_size: self.sms_package_size,
                package_price: self.sms_package_price,
                sent: self.sms_sent_this_month,
                overage_rate: self.sms_overage_rate,
                overage_charge: self.sms_overage_charge,
            },
            MessageChannel::Email => ChannelUsage {
                channel,
                package_active: true,
                package_size: self.email_monthly_limit,
                package_price: Money::zero(),
                sent: self.emails_sent_this_month,
                overage_rate: self.email_overage_rate,
                overage_charge: self.email_overage_charge,
            },
        }
    }
}

/// Messages beyond the package, never negative.
#[inline]
pub fn units_over(sent: i64, package_size: i64) -> i64 {
    (sent - package_size).max(0)
}

/// `max(0, sent − package) × rate`.
pub fn overage_charge(sent: i64, package_size: i64, rate: Money) -> Money {
    rate.multiply_quantity(units_over(sent, package_size))
}

// =============================================================================
// Invoices
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum InvoiceStatus {
    /// Issued, collection not confirmed.
    Pending,
    Paid,
    Failed,
}

/// The priced content of a usage invoice, before it is stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct InvoiceQuote {
    pub channel: MessageChannel,
    pub billing_period: PaymentPeriod,
    pub invoice_number: String,
    pub units_over_limit: i64,
    pub overage_rate: Money,
    pub overage_charge: Money,
    pub package_charge: Money,
    pub subtotal: Money,
    pub vat_rate: Rate,
    pub vat_amount: Money,
    pub total_amount: Money,
    #[ts(as = "String")]
    pub due_date: NaiveDate,
}

/// Inputs that do not come from the usage row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvoiceTerms {
    pub vat_rate: Rate,
    /// Day of the month after the billing period the invoice is due.
    pub due_day: u32,
}

/// Prices the month's usage for one channel.
///
/// Returns `None` when there is nothing to bill: SMS package inactive, or
/// neither an overage nor a package fee.
pub fn quote_invoice(
    tenant_id: &str,
    usage: &ChannelUsage,
    period: PaymentPeriod,
    terms: InvoiceTerms,
) -> Option<InvoiceQuote> {
    if !usage.package_active {
        return None;
    }

    let units = usage.units_over();
    let overage = usage.overage_rate.multiply_quantity(units);
    let package_charge = if usage.package_price.is_positive() {
        usage.package_price
    } else {
        Money::zero()
    };

    if !overage.is_positive() && !package_charge.is_positive() {
        return None;
    }

    let subtotal = overage.max(Money::zero()) + package_charge;
    let vat_amount = subtotal.percentage(terms.vat_rate);

    Some(InvoiceQuote {
        channel: usage.channel,
        billing_period: period,
        invoice_number: invoice_number(usage.channel, tenant_id, period),
        units_over_limit: units,
        overage_rate: usage.overage_rate,
        overage_charge: overage.max(Money::zero()),
        package_charge,
        subtotal,
        vat_rate: terms.vat_rate,
        vat_amount,
        total_amount: subtotal + vat_amount,
        due_date: due_date(period, terms.due_day),
    })
}

/// `SMS-202503-1a2b3c4d`: channel, period, first 8 characters of the tenant.
pub fn invoice_number(channel: MessageChannel, tenant_id: &str, period: PaymentPeriod) -> String {
    let short: String = tenant_id.chars().take(8).collect();
    format!("{}-{}-{}", channel.invoice_prefix(), period.compact(), short)
}

/// `due_day` of the following month, clamped to that month's last day.
pub fn due_date(period: PaymentPeriod, due_day: u32) -> NaiveDate {
    let next = period.next();
    let last = next.last_day();
    NaiveDate::from_ymd_opt(next.year(), next.month(), due_day.max(1))
        .filter(|d| *d <= last)
        .unwrap_or(last)
}

/// A stored usage invoice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct UsageInvoice {
    pub id: i64,
    pub tenant_id: String,
    pub channel: MessageChannel,
    pub invoice_number: String,
    pub billing_period: PaymentPeriod,
    pub units_over_limit: i64,
    pub overage_rate: Money,
    pub overage_charge: Money,
    pub package_charge: Money,
    pub subtotal: Money,
    pub vat_rate: Rate,
    pub vat_amount: Money,
    pub total_amount: Money,
    pub currency: String,
    pub status: InvoiceStatus,
    pub external_reference: Option<String>,
    #[ts(as = "String")]
    pub due_date: NaiveDate,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Unit Tests
// =============================================================================
