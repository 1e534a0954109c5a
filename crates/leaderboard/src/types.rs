use serde::{Deserialize, Serialize};

/// Identifier of a ranked customer.
pub type CustomerId = i64;

/// A customer's current score.
///
/// Scores handed out by the [`ScoreStore`](crate::ScoreStore) are always
/// finite and non-negative.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerScore {
    pub customer_id: CustomerId,
    pub score: f64,
}

impl CustomerScore {
    pub const fn new(customer_id: CustomerId, score: f64) -> Self {
        Self { customer_id, score }
    }
}

/// Message carried through the rebuild pipeline: the raw score a customer
/// holds after one accepted delta.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScoreUpdate {
    pub id: CustomerId,
    pub score: f64,
}

/// A customer annotated with its 1-indexed rank in a snapshot.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedCustomer {
    pub customer_id: CustomerId,
    pub score: f64,
    pub rank: usize,
}

/// Traversal direction for rank-based range reads.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Order {
    /// Highest score first; ties broken by ascending id.
    #[default]
    Descending,
    /// Lowest score first; the exact reverse of [`Order::Descending`].
    Ascending,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn ranked_customer_wire_shape() {
        let ranked = RankedCustomer {
            customer_id: 2,
            score: 70.0,
            rank: 1,
        };
        assert_eq!(
            serde_json::to_value(ranked).unwrap(),
            json!({ "customerId": 2, "score": 70.0, "rank": 1 })
        );

        let parsed: CustomerScore =
            serde_json::from_value(json!({ "customerId": 9, "score": 1.5 })).unwrap();
        assert_eq!(parsed, CustomerScore::new(9, 1.5));
    }
}
