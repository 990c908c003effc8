use crate::error::{CartError, Result};
use serde::Deserialize;
use std::io::Read;

#[derive(Debug, Deserialize, PartialEq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
enum CommandOp {
    Start,
    End,
    Scan,
    Toggle,
    Remove,
    View,
    Checkout,
    Verify,
    Orders,
}

#[derive(Debug, Deserialize)]
struct CommandRecord {
    op: CommandOp,
    credential: String,
    #[serde(default)]
    arg: Option<String>,
    #[serde(default)]
    extra: Option<String>,
}

/// One row of a replay script, on behalf of `credential`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptedCommand {
    pub credential: String,
    pub command: CartCommand,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CartCommand {
    Start { cart_barcode: String },
    End,
    Scan { rfid_tag: String },
    Toggle { rfid_tag: String },
    Remove { product_id: String },
    View,
    Checkout {
        payment_method: String,
        card_number: Option<String>,
    },
    /// `None` replays the code last sent to the shopper.
    Verify { code: Option<String> },
    Orders,
}

impl TryFrom<CommandRecord> for ScriptedCommand {
    type Error = CartError;

    fn try_from(record: CommandRecord) -> Result<Self> {
        let arg = record.arg.filter(|a| !a.is_empty());
        let extra = record.extra.filter(|e| !e.is_empty());
        let required = |field: &'static str| arg.clone().ok_or(CartError::MissingField(field));

        let command = match record.op {
            CommandOp::Start => CartCommand::Start {
                cart_barcode: required("cart_barcode")?,
            },
            CommandOp::End => CartCommand::End,
            CommandOp::Scan => CartCommand::Scan {
                rfid_tag: required("rfid_tag")?,
            },
            CommandOp::Toggle => CartCommand::Toggle {
                rfid_tag: required("rfid_tag")?,
            },
            CommandOp::Remove => CartCommand::Remove {
                product_id: required("product_id")?,
            },
            CommandOp::View => CartCommand::View,
            CommandOp::Checkout => CartCommand::Checkout {
                payment_method: required("payment_method")?,
                card_number: extra,
            },
            CommandOp::Verify => CartCommand::Verify { code: arg.clone() },
            CommandOp::Orders => CartCommand::Orders,
        };

        Ok(Self {
            credential: record.credential,
            command,
        })
    }
}

/// Reads a replay script: `op, credential, arg, extra`.
///
/// Whitespace is trimmed and short rows are accepted, so `end, alice` needs
/// no trailing commas.
pub struct CommandReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> CommandReader<R> {
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    /// Lazily parses rows. A bad row yields an error without ending the
    /// stream.
    pub fn commands(self) -> impl Iterator<Item = Result<ScriptedCommand>> {
        self.reader.into_deserialize().map(|result| {
            result
                .map_err(CartError::from)
                .and_then(|record: CommandRecord| ScriptedCommand::try_from(record))
        })
    }
}
