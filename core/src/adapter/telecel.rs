//! Telecel exports: A/B-number CDR and Telecel Cash ledger.

use super::{content_key, detect_layout, parse_amount, parse_duration, ExportLayout, Header, OperatorAdapter, RawRow};
use crate::{
    error::{AnalysisError, AnalysisResult},
    record::{normalize_subject, Operator, RecordType, TransactionRecord},
};

const CDR_COLUMNS: &[&str] = &["A Number", "B Number", "Service", "Start Time", "Duration"];
const CASH_COLUMNS: &[&str] = &["Transaction ID", "Date", "Type", "Sender", "Receiver", "Amount"];

pub struct TelecelAdapter;

impl TelecelAdapter {
    fn map_cdr(&self, row: &RawRow<'_>) -> AnalysisResult<TransactionRecord> {
        let op = Operator::Telecel;
        let service = row.require(op, "Service")?.to_ascii_lowercase();
        let record_type = if service.contains("sms") {
            RecordType::Sms
        } else if service.contains("voice") || service.contains("call") || service == "moc" || service == "mtc" {
            RecordType::Call
        } else {
            return Err(AnalysisError::schema(op, format!("line {}: unsupported service '{service}'", row.line)));
        };

        let timestamp = row.timestamp(op, "Start Time")?;
        let a_number = row.subject(op, "A Number")?;
        let b_number = row.get("B Number").and_then(normalize_subject);
        let duration = match record_type {
            RecordType::Call => {
                let raw = row.require(op, "Duration")?;
                Some(parse_duration(raw).ok_or_else(|| {
                    AnalysisError::schema(op, format!("line {}: bad duration '{raw}'", row.line))
                })?)
            }
            _ => None,
        };

        let raw_native_id = match row.get("Record ID") {
            Some(id) => id.to_string(),
            None => content_key(
                record_type.as_str(),
                timestamp,
                &a_number,
                b_number.as_deref(),
                duration.map(|d| d as f64),
            ),
        };

        Ok(TransactionRecord {
            record_id: TransactionRecord::record_id_for(op, &raw_native_id),
            raw_native_id,
            timestamp,
            source_operator: op,
            record_type,
            originating_identifier: a_number,
            terminating_identifier: b_number,
            amount: None,
            duration,
            location_cell: row.location(&["Cell ID"]),
            device_imei: row.imei(),
        })
    }

    fn map_cash(&self, row: &RawRow<'_>) -> AnalysisResult<TransactionRecord> {
        let op = Operator::Telecel;
        let kind = row.require(op, "Type")?.to_ascii_lowercase();
        let record_type = if kind.contains("cash out") || kind.contains("withdraw") {
            RecordType::MobileMoneyCashout
        } else if kind.contains("cash in") || kind.contains("deposit") {
            RecordType::MobileMoneyCashin
        } else if kind.contains("transfer") || kind.contains("send") || kind.contains("p2p") || kind.contains("payment") {
            RecordType::MobileMoneyTransfer
        } else {
            return Err(AnalysisError::schema(op, format!("line {}: unsupported type '{kind}'", row.line)));
        };

        let raw_native_id = row.require(op, "Transaction ID")?.to_string();
        let timestamp = row.timestamp(op, "Date")?;
        let sender = row.subject(op, "Sender")?;
        let receiver = row.get("Receiver").and_then(normalize_subject);
        let raw_amount = row.require(op, "Amount")?;
        let amount = parse_amount(raw_amount).ok_or_else(|| {
            AnalysisError::schema(op, format!("line {}: bad amount '{raw_amount}'", row.line))
        })?;

        Ok(TransactionRecord {
            record_id: TransactionRecord::record_id_for(op, &raw_native_id),
            raw_native_id,
            timestamp,
            source_operator: op,
            record_type,
            originating_identifier: sender,
            terminating_identifier: receiver,
            amount: Some(amount),
            duration: None,
            location_cell: row.location(&["Cell ID"]),
            device_imei: None,
        })
    }
}

impl OperatorAdapter for TelecelAdapter {
    fn operator(&self) -> Operator {
        Operator::Telecel
    }

    fn parse_header(&self, header: &Header) -> AnalysisResult<ExportLayout> {
        detect_layout(Operator::Telecel, header, CDR_COLUMNS, CASH_COLUMNS)
    }

    fn map_row_to_record(&self, layout: ExportLayout, row: &RawRow<'_>) -> AnalysisResult<TransactionRecord> {
        match layout {
            ExportLayout::Cdr => self.map_cdr(row),
            ExportLayout::MobileMoney => self.map_cash(row),
        }
    }
}
