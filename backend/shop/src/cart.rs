//! # Cart
//!
//! Cart state and the reducer applied to it. Pure: stock and prices are checked by the caller.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const MAX_LINE_QUANTITY: u32 = 99;
pub const MAX_CART_LINES: usize = 50;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum CartError {
    #[error("Quantity must be at least 1")]
    InvalidQuantity,

    #[error("At most {MAX_LINE_QUANTITY} of one item per order")]
    QuantityTooLarge,

    #[error("Cart cannot hold more than {MAX_CART_LINES} different items")]
    TooManyLines,

    #[error("Item is not in the cart")]
    LineNotFound,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct CartLine {
    pub product_id: String,
    pub sku: String,
    pub quantity: u32,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Cart {
    pub lines: Vec<CartLine>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub enum CartAction {
    Add {
        product_id: String,
        sku: String,
        quantity: u32,
    },
    /// Zero removes the line.
    SetQuantity { product_id: String, quantity: u32 },
    Remove { product_id: String },
    Clear,
}

impl Default for Cart {
    fn default() -> Self {
        Self {
            lines: Vec::new(),
            updated_at: Utc::now(),
        }
    }
}

impl Cart {
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn item_count(&self) -> u32 {
        self.lines.iter().map(|line| line.quantity).sum()
    }

    pub fn line(&self, product_id: &str) -> Option<&CartLine> {
        self.lines.iter().find(|line| line.product_id == product_id)
    }

    /// Applies `action`, leaving the cart untouched on error.
    pub fn apply(&mut self, action: CartAction) -> Result<(), CartError> {
        match action {
            CartAction::Add {
                product_id,
                sku,
                quantity,
            } => {
                if quantity == 0 {
                    return Err(CartError::InvalidQuantity);
                }

                match self.position(&product_id) {
                    Some(index) => {
                        let merged = self.lines[index].quantity.saturating_add(quantity);
                        if merged > MAX_LINE_QUANTITY {
                            return Err(CartError::QuantityTooLarge);
                        }

                        self.lines[index].quantity = merged;
                    }
                    None => {
                        if quantity > MAX_LINE_QUANTITY {
                            return Err(CartError::QuantityTooLarge);
                        }
                        if self.lines.len() >= MAX_CART_LINES {
                            return Err(CartError::TooManyLines);
                        }

                        self.lines.push(CartLine {
                            product_id,
                            sku,
                            quantity,
                        });
                    }
                }
            }
            CartAction::SetQuantity {
                product_id,
                quantity,
            } => {
                let index = self
                    .position(&product_id)
                    .ok_or(CartError::LineNotFound)?;

                if quantity == 0 {
                    self.lines.remove(index);
                } else if quantity > MAX_LINE_QUANTITY {
                    return Err(CartError::QuantityTooLarge);
                } else {
                    self.lines[index].quantity = quantity;
                }
            }
            CartAction::Remove { product_id } => {
                let index = self
                    .position(&product_id)
                    .ok_or(CartError::LineNotFound)?;

                self.lines.remove(index);
            }
            CartAction::Clear => self.lines.clear(),
        }

        self.updated_at = Utc::now();

        Ok(())
    }

    fn position(&self, product_id: &str) -> Option<usize> {
        self.lines
            .iter()
            .position(|line| line.product_id == product_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn add(id: &str, quantity: u32) -> CartAction {
        CartAction::Add {
            product_id: id.to_string(),
            sku: id.to_uppercase(),
            quantity,
        }
    }

    #[test]
    fn test_add_merges_lines() {
        let mut cart = Cart::default();

        cart.apply(add("latte", 2)).unwrap();
        cart.apply(add("mocha", 1)).unwrap();
        cart.apply(add("latte", 3)).unwrap();

        assert_eq!(cart.lines.len(), 2);
        assert_eq!(cart.lines[0].product_id, "latte");
        assert_eq!(cart.line("latte").unwrap().quantity, 5);
        assert_eq!(cart.item_count(), 6);
    }

    #[test]
    fn test_quantity_bounds() {
        let mut cart = Cart::default();

        assert_eq!(cart.apply(add("latte", 0)), Err(CartError::InvalidQuantity));
        assert_eq!(cart.apply(add("latte", 100)), Err(CartError::QuantityTooLarge));

        cart.apply(add("latte", 98)).unwrap();
        assert_eq!(cart.apply(add("latte", 2)), Err(CartError::QuantityTooLarge));
        assert_eq!(cart.line("latte").unwrap().quantity, 98);
    }

    #[test]
    fn test_set_quantity_zero_removes() {
        let mut cart = Cart::default();
        cart.apply(add("latte", 2)).unwrap();

        cart.apply(CartAction::SetQuantity {
            product_id: "latte".to_string(),
            quantity: 7,
        })
        .unwrap();
        assert_eq!(cart.item_count(), 7);

        cart.apply(CartAction::SetQuantity {
            product_id: "latte".to_string(),
            quantity: 0,
        })
        .unwrap();
        assert!(cart.is_empty());

        assert_eq!(
            cart.apply(CartAction::Remove {
                product_id: "latte".to_string()
            }),
            Err(CartError::LineNotFound)
        );
    }

    #[test]
    fn test_line_limit_and_clear() {
        let mut cart = Cart::default();

        for i in 0..MAX_CART_LINES {
            cart.apply(add(&format!("p{i}"), 1)).unwrap();
        }
        assert_eq!(cart.apply(add("one-more", 1)), Err(CartError::TooManyLines));

        cart.apply(add("p0", 1)).unwrap();

        cart.apply(CartAction::Clear).unwrap();
        assert!(cart.is_empty());
    }
}
