use crate::websocket::{Notification, NotificationError};
use chrono::{DateTime, Utc};
use serde_json::json;

pub const MONEY_SENT: &str = "money_sent";
pub const MONEY_RECEIVED: &str = "money_received";
pub const DEPOSIT_COMPLETED: &str = "deposit_completed";
pub const DEPOSIT_PROCESSED: &str = "deposit_processed";
pub const ATM_WITHDRAWAL_COMPLETED: &str = "atm_withdrawal_completed";

/// Event types produced by the builders in this module.
pub const EVENT_TYPES: &[&str] = &[
    MONEY_SENT,
    MONEY_RECEIVED,
    DEPOSIT_COMPLETED,
    DEPOSIT_PROCESSED,
    ATM_WITHDRAWAL_COMPLETED,
];

#[derive(Debug, Clone)]
pub struct TransferCompleted {
    pub transfer_id: i64,
    pub sender_id: i64,
    pub receiver_id: i64,
    pub amount: f64,
    pub sender_balance: f64,
    pub receiver_balance: f64,
    pub reference: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct DepositCompleted {
    pub user_id: i64,
    /// Admin who processed the deposit
    pub admin_id: i64,
    pub amount: f64,
    pub balance: f64,
    pub reference: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct WithdrawalCompleted {
    pub withdrawal_id: i64,
    pub user_id: i64,
    pub amount: f64,
    pub balance: f64,
    pub reference: String,
    pub created_at: DateTime<Utc>,
}

pub fn money_sent(t: &TransferCompleted) -> Result<Notification, NotificationError> {
    Notification::new(
        MONEY_SENT,
        json!({
            "transfer_id": t.transfer_id,
            "amount": t.amount,
            "receiver_id": t.receiver_id,
            "balance": t.sender_balance,
            "reference": t.reference,
            "timestamp": t.timestamp,
        }),
    )
}

pub fn money_received(t: &TransferCompleted) -> Result<Notification, NotificationError> {
    Notification::new(
        MONEY_RECEIVED,
        json!({
            "transfer_id": t.transfer_id,
            "amount": t.amount,
            "sender_id": t.sender_id,
            "balance": t.receiver_balance,
            "reference": t.reference,
            "timestamp": t.timestamp,
        }),
    )
}

// Field casing of `CreatedAt` is what existing clients read.
pub fn deposit_completed(d: &DepositCompleted) -> Result<Notification, NotificationError> {
    Notification::new(
        DEPOSIT_COMPLETED,
        json!({
            "amount": d.amount,
            "balance": d.balance,
            "reference": d.reference,
            "CreatedAt": d.created_at,
        }),
    )
}

pub fn deposit_processed(d: &DepositCompleted) -> Result<Notification, NotificationError> {
    Notification::new(
        DEPOSIT_PROCESSED,
        json!({
            "user_id": d.user_id,
            "amount": d.amount,
            "admin_id": d.admin_id,
            "reference": d.reference,
        }),
    )
}

pub fn atm_withdrawal_completed(w: &WithdrawalCompleted) -> Result<Notification, NotificationError> {
    Notification::new(
        ATM_WITHDRAWAL_COMPLETED,
        json!({
            "withdrawal_id": w.withdrawal_id,
            "amount": w.amount,
            "balance": w.balance,
            "reference": w.reference,
            "CreatedAt": w.created_at,
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transfer() -> TransferCompleted {
        TransferCompleted {
            transfer_id: 31,
            sender_id: 1,
            receiver_id: 2,
            amount: 40.5,
            sender_balance: 59.5,
            receiver_balance: 140.5,
            reference: "TRF-31".to_string(),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_transfer_payloads_show_own_balance() {
        let t = transfer();

        let sent = money_sent(&t).unwrap();
        assert_eq!(sent.event_type(), MONEY_SENT);
        assert_eq!(sent.data()["balance"], 59.5);
        assert_eq!(sent.data()["receiver_id"], 2);
        assert!(sent.data().get("sender_id").is_none());

        let received = money_received(&t).unwrap();
        assert_eq!(received.event_type(), MONEY_RECEIVED);
        assert_eq!(received.data()["balance"], 140.5);
        assert_eq!(received.data()["sender_id"], 1);
    }

    #[test]
    fn test_withdrawal_payload() {
        let w = WithdrawalCompleted {
            withdrawal_id: 9,
            user_id: 5,
            amount: 20.0,
            balance: 80.0,
            reference: "ATM-9".to_string(),
            created_at: Utc::now(),
        };
        let n = atm_withdrawal_completed(&w).unwrap();
        assert_eq!(n.data()["withdrawal_id"], 9);
        assert!(n.data().contains_key("CreatedAt"));
    }
}
