// Transaction data structures and ownership proofs

use crate::core::serialize::{
    read_array, read_count, read_opt_hash, read_var_bytes, write_opt_hash, write_var_bytes,
    write_varint,
};
use crate::core::{Hash256, Serializable, hash160, sha256};
use crate::error::{LedgerError, Result};
use secp256k1::{Message, PublicKey, Secp256k1, SecretKey, ecdsa::Signature};
use std::collections::HashMap;
use std::fmt;
use std::io::{self, Read, Write};

/// Output index carried by the sentinel input of a coinbase transaction
pub const COINBASE_OUTPUT_INDEX: i64 = -1;

/// Length of a public key stored as `x || y`
pub const PUBLIC_KEY_LENGTH: usize = 64;

/// Length of a compact `r || s` signature
pub const SIGNATURE_LENGTH: usize = 64;

/// Previous transactions referenced by the inputs of a transaction, keyed by id
pub type PrevTransactions = HashMap<Hash256, Transaction>;

/// Transaction input - references a previous transaction output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxInput {
    /// Id of the transaction holding the spent output; `None` for coinbase
    pub prev_tx_id: Option<Hash256>,
    /// Index of the output in the previous transaction
    pub output_index: i64,
    /// Compact ECDSA signature (`r || s`)
    pub signature: Vec<u8>,
    /// Spender's public key (`x || y`); arbitrary data for coinbase
    pub public_key: Vec<u8>,
}

impl TxInput {
    /// Create an unsigned input spending `prev_tx_id:output_index`
    pub fn new(prev_tx_id: Hash256, output_index: u32, public_key: Vec<u8>) -> Self {
        Self {
            prev_tx_id: Some(prev_tx_id),
            output_index: output_index as i64,
            signature: Vec::new(),
            public_key,
        }
    }

    /// Create the sentinel input of a coinbase transaction
    pub fn coinbase(data: Vec<u8>) -> Self {
        Self {
            prev_tx_id: None,
            output_index: COINBASE_OUTPUT_INDEX,
            signature: Vec::new(),
            public_key: data,
        }
    }

    pub fn is_coinbase(&self) -> bool {
        self.prev_tx_id.is_none() && self.output_index == COINBASE_OUTPUT_INDEX
    }

    /// The output this input spends, as `(transaction id, output index)`
    pub fn outpoint(&self) -> Result<(Hash256, usize)> {
        let prev_tx_id = self.prev_tx_id.ok_or_else(|| {
            LedgerError::Consistency("coinbase input does not reference an output".to_string())
        })?;
        let index = usize::try_from(self.output_index).map_err(|_| {
            LedgerError::Consistency(format!(
                "negative output index {} in input spending {}",
                self.output_index, prev_tx_id
            ))
        })?;
        Ok((prev_tx_id, index))
    }

    /// Check whether the unlocking key hashes to `key_hash`
    pub fn uses_key(&self, key_hash: &[u8]) -> bool {
        hash160(&self.public_key).as_slice() == key_hash
    }

    fn encode_fields<W: Write>(&self, writer: &mut W, with_signature: bool) -> io::Result<()> {
        write_opt_hash(writer, self.prev_tx_id.as_ref())?;
        writer.write_all(&self.output_index.to_le_bytes())?;
        if with_signature {
            write_var_bytes(writer, &self.signature)?;
        } else {
            write_var_bytes(writer, &[])?;
        }
        write_var_bytes(writer, &self.public_key)
    }
}

impl Serializable for TxInput {
    fn encode<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        self.encode_fields(writer, true)
    }

    fn decode<R: Read>(reader: &mut R) -> Result<Self> {
        let prev_tx_id = read_opt_hash(reader)?;
        let output_index = i64::from_le_bytes(read_array(reader)?);
        let signature = read_var_bytes(reader).map_err(LedgerError::corruption)?;
        let public_key = read_var_bytes(reader).map_err(LedgerError::corruption)?;

        Ok(Self {
            prev_tx_id,
            output_index,
            signature,
            public_key,
        })
    }
}

/// Transaction output - value locked to a key-hash
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxOutput {
    pub value: u64,
    /// HASH160 of the owner's public key
    pub owner_key_hash: Vec<u8>,
}

impl TxOutput {
    pub fn new(value: u64, owner_key_hash: impl Into<Vec<u8>>) -> Self {
        Self {
            value,
            owner_key_hash: owner_key_hash.into(),
        }
    }

    pub fn is_locked_with_key(&self, key_hash: &[u8]) -> bool {
        self.owner_key_hash == key_hash
    }
}

impl Serializable for TxOutput {
    fn encode<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_all(&self.value.to_le_bytes())?;
        write_var_bytes(writer, &self.owner_key_hash)
    }

    fn decode<R: Read>(reader: &mut R) -> Result<Self> {
        let value = u64::from_le_bytes(read_array(reader)?);
        let owner_key_hash = read_var_bytes(reader).map_err(LedgerError::corruption)?;
        Ok(Self {
            value,
            owner_key_hash,
        })
    }
}

/// Transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    /// Content hash, see [`Transaction::hash`]
    pub id: Hash256,
    pub inputs: Vec<TxInput>,
    pub outputs: Vec<TxOutput>,
}

impl Transaction {
    /// Create a transaction and compute its id
    pub fn new(inputs: Vec<TxInput>, outputs: Vec<TxOutput>) -> Self {
        let mut tx = Self {
            id: Hash256::default(),
            inputs,
            outputs,
        };
        tx.id = tx.hash();
        tx
    }

    /// Create a coinbase transaction issuing `reward` to `to_key_hash`
    pub fn coinbase(to_key_hash: &[u8], data: &str, reward: u64) -> Self {
        let data = if data.is_empty() {
            format!("Coins to {}", hex::encode(to_key_hash))
        } else {
            data.to_string()
        };

        Self::new(
            vec![TxInput::coinbase(data.into_bytes())],
            vec![TxOutput::new(reward, to_key_hash)],
        )
    }

    pub fn is_coinbase(&self) -> bool {
        self.inputs.len() == 1 && self.inputs[0].is_coinbase()
    }

    /// SHA256 over the canonical content: inputs without signatures, then outputs.
    /// The id field itself is not part of the pre-image.
    pub fn hash(&self) -> Hash256 {
        let mut buf = Vec::new();
        // Writing into a Vec cannot fail
        let _ = self.encode_content(&mut buf);
        sha256(&buf)
    }

    fn encode_content<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        write_varint(writer, self.inputs.len() as u64)?;
        for input in &self.inputs {
            input.encode_fields(writer, false)?;
        }
        write_varint(writer, self.outputs.len() as u64)?;
        for output in &self.outputs {
            output.encode(writer)?;
        }
        Ok(())
    }

    pub fn total_output_value(&self) -> u64 {
        self.outputs.iter().map(|out| out.value).sum()
    }

    /// Copy with every signature and unlocking key cleared
    pub fn trimmed_copy(&self) -> Self {
        let inputs = self
            .inputs
            .iter()
            .map(|input| TxInput {
                prev_tx_id: input.prev_tx_id,
                output_index: input.output_index,
                signature: Vec::new(),
                public_key: Vec::new(),
            })
            .collect();

        Self {
            id: self.id,
            inputs,
            outputs: self.outputs.clone(),
        }
    }

    /// The message signed for input `index`: the hash of the trimmed copy where only
    /// that input carries the owner key-hash of the output it spends
    fn signing_hash(trimmed: &mut Self, index: usize, prev_key_hash: &[u8]) -> Hash256 {
        trimmed.inputs[index].public_key = prev_key_hash.to_vec();
        let hash = trimmed.hash();
        trimmed.inputs[index].public_key = Vec::new();
        hash
    }

    /// Look up the output spent by `input` among the previous transactions
    fn referenced_output<'a>(
        input: &TxInput,
        prev_txs: &'a PrevTransactions,
    ) -> Result<&'a TxOutput> {
        let (prev_tx_id, index) = input.outpoint()?;
        let prev_tx = prev_txs
            .get(&prev_tx_id)
            .ok_or(LedgerError::TransactionNotFound(prev_tx_id))?;
        prev_tx.outputs.get(index).ok_or_else(|| {
            LedgerError::Consistency(format!(
                "transaction {} has no output {}",
                prev_tx_id, index
            ))
        })
    }

    /// Sign every input with `secret_key`. Coinbase transactions are left untouched.
    pub fn sign(&mut self, secret_key: &SecretKey, prev_txs: &PrevTransactions) -> Result<()> {
        if self.is_coinbase() {
            return Ok(());
        }

        // Resolve every reference before producing any signature
        let prev_key_hashes = self
            .inputs
            .iter()
            .map(|input| Self::referenced_output(input, prev_txs).map(|o| o.owner_key_hash.clone()))
            .collect::<Result<Vec<_>>>()?;

        let secp = Secp256k1::signing_only();
        let mut trimmed = self.trimmed_copy();

        for (index, prev_key_hash) in prev_key_hashes.iter().enumerate() {
            let digest = Self::signing_hash(&mut trimmed, index, prev_key_hash);
            let message = Message::from_digest(*digest.as_bytes());
            let signature = secp.sign_ecdsa(&message, secret_key);
            self.inputs[index].signature = signature.serialize_compact().to_vec();
        }

        Ok(())
    }

    /// Verify every input's signature against the output it spends.
    /// Returns `Ok(false)` for a bad proof and an error for an unknown reference.
    pub fn verify(&self, prev_txs: &PrevTransactions) -> Result<bool> {
        if self.is_coinbase() {
            return Ok(true);
        }

        let prev_outputs = self
            .inputs
            .iter()
            .map(|input| Self::referenced_output(input, prev_txs))
            .collect::<Result<Vec<_>>>()?;

        let secp = Secp256k1::verification_only();
        let mut trimmed = self.trimmed_copy();

        for (index, (input, prev_output)) in self.inputs.iter().zip(prev_outputs).enumerate() {
            if !input.uses_key(&prev_output.owner_key_hash) {
                return Ok(false);
            }

            let Some(public_key) = decode_public_key(&input.public_key) else {
                return Ok(false);
            };
            if input.signature.len() != SIGNATURE_LENGTH {
                return Ok(false);
            }
            let Ok(signature) = Signature::from_compact(&input.signature) else {
                return Ok(false);
            };

            let digest = Self::signing_hash(&mut trimmed, index, &prev_output.owner_key_hash);
            let message = Message::from_digest(*digest.as_bytes());
            if secp.verify_ecdsa(&message, &signature, &public_key).is_err() {
                return Ok(false);
            }
        }

        Ok(true)
    }
}

/// Store a public key as its two affine coordinates, `x || y`
pub fn encode_public_key(public_key: &PublicKey) -> Vec<u8> {
    public_key.serialize_uncompressed()[1..].to_vec()
}

/// Rebuild a public key from its stored `x || y` coordinates
pub fn decode_public_key(bytes: &[u8]) -> Option<PublicKey> {
    if bytes.len() != PUBLIC_KEY_LENGTH {
        return None;
    }
    let (x, y) = bytes.split_at(PUBLIC_KEY_LENGTH / 2);
    let mut uncompressed = [0u8; PUBLIC_KEY_LENGTH + 1];
    uncompressed[0] = 0x04;
    uncompressed[1..33].copy_from_slice(x);
    uncompressed[33..].copy_from_slice(y);
    PublicKey::from_slice(&uncompressed).ok()
}

impl Serializable for Transaction {
    fn encode<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_all(self.id.as_bytes())?;
        write_varint(writer, self.inputs.len() as u64)?;
        for input in &self.inputs {
            input.encode(writer)?;
        }
        write_varint(writer, self.outputs.len() as u64)?;
        for output in &self.outputs {
            output.encode(writer)?;
        }
        Ok(())
    }

    fn decode<R: Read>(reader: &mut R) -> Result<Self> {
        let id = Hash256::new(read_array(reader)?);

        let input_count = read_count(reader)?;
        let mut inputs = Vec::with_capacity(input_count);
        for _ in 0..input_count {
            inputs.push(TxInput::decode(reader)?);
        }

        let output_count = read_count(reader)?;
        let mut outputs = Vec::with_capacity(output_count);
        for _ in 0..output_count {
            outputs.push(TxOutput::decode(reader)?);
        }

        Ok(Self {
            id,
            inputs,
            outputs,
        })
    }
}

impl fmt::Display for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "--- Transaction {}:", self.id)?;
        for (i, input) in self.inputs.iter().enumerate() {
            writeln!(f, "     Input {}:", i)?;
            match &input.prev_tx_id {
                Some(id) => writeln!(f, "       Previous tx:  {}", id)?,
                None => writeln!(f, "       Previous tx:  (coinbase)")?,
            }
            writeln!(f, "       Output index: {}", input.output_index)?;
            writeln!(f, "       Signature:    {}", hex::encode(&input.signature))?;
            writeln!(f, "       Public key:   {}", hex::encode(&input.public_key))?;
        }
        for (i, output) in self.outputs.iter().enumerate() {
            writeln!(f, "     Output {}:", i)?;
            writeln!(f, "       Value:    {}", output.value)?;
            writeln!(f, "       Key hash: {}", hex::encode(&output.owner_key_hash))?;
        }
        Ok(())
    }
}
