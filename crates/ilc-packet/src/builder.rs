//! `*Builder` convenience constructors, matching the teacher's
//! `PrepareBuilder`/`FulfillBuilder`/`AccountBuilder` convention.

use std::time::SystemTime;

use bytes::Bytes;

use crate::address::IlpAddress;
use crate::error_code::ErrorCode;
use crate::packet::{Fulfill, Prepare, Reject};

#[derive(Debug, Clone)]
pub struct PrepareBuilder {
    pub amount: u64,
    pub expires_at: SystemTime,
    pub execution_condition: [u8; 32],
    pub destination: IlpAddress,
    pub data: Bytes,
}

impl PrepareBuilder {
    pub fn build(self) -> Prepare {
        Prepare {
            amount: self.amount,
            expires_at: self.expires_at,
            execution_condition: self.execution_condition,
            destination: self.destination,
            data: self.data,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct FulfillBuilder {
    pub fulfillment: [u8; 32],
    pub data: Bytes,
}

impl FulfillBuilder {
    pub fn build(self) -> Fulfill {
        Fulfill {
            fulfillment: self.fulfillment,
            data: self.data,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RejectBuilder {
    pub code: Option<ErrorCode>,
    pub triggered_by: Option<IlpAddress>,
    pub message: String,
    pub data: Bytes,
}

impl RejectBuilder {
    pub fn build(self) -> Reject {
        Reject {
            code: self.code.unwrap_or(ErrorCode::F99_APPLICATION_ERROR),
            triggered_by: self.triggered_by,
            message: self.message,
            data: self.data,
        }
    }
}
