//! Encoder loading and hidden-state extraction.

use std::path::Path;

use anyhow::anyhow;
use rust_bert::bert::{BertConfig, BertEmbeddings, BertModel};
use rust_bert::distilbert::{DistilBertConfig, DistilBertModel};
use rust_bert::pipelines::common::ModelType;
use rust_bert::roberta::{RobertaConfig, RobertaForMaskedLM};
use rust_bert::Config;
use tch::{nn::VarStore, no_grad, Device, Tensor};

use crate::Result;

enum EncoderModel {
    Bert(BertModel<BertEmbeddings>),
    DistilBert(DistilBertModel),
    /// RoBERTa and XLM-RoBERTa share one architecture.
    Roberta(RobertaForMaskedLM),
}

/// A pre-trained encoder configured to return every hidden layer.
pub struct Encoder {
    _vs: VarStore,
    encoder: EncoderModel,
    device: Device,
}

impl Encoder {
    /// Builds the encoder for `model_type` from a local config and weights file.
    pub fn new(model_type: ModelType, config_path: &Path, weights_path: &Path, device: Device) -> Result<Self> {
        let mut var_store = VarStore::new(device);

        let encoder = match model_type {
            ModelType::Bert => {
                let mut config = BertConfig::from_file(config_path);
                config.output_hidden_states = Some(true);
                EncoderModel::Bert(BertModel::<BertEmbeddings>::new(var_store.root(), &config))
            }
            ModelType::DistilBert => {
                let mut config = DistilBertConfig::from_file(config_path);
                config.output_hidden_states = Some(true);
                EncoderModel::DistilBert(DistilBertModel::new(var_store.root(), &config))
            }
            ModelType::Roberta | ModelType::XLMRoberta => {
                let mut config = RobertaConfig::from_file(config_path);
                config.output_hidden_states = Some(true);
                EncoderModel::Roberta(RobertaForMaskedLM::new(var_store.root(), &config))
            }
            other => return Err(anyhow!("Model type {:?} not supported", other)),
        };
        var_store.load(weights_path)?;

        Ok(Self {
            _vs: var_store,
            encoder,
            device,
        })
    }

    /// Hidden states of every layer (embeddings first), each (batch, seq_len, hidden).
    pub fn forward(
        &self,
        input_ids: &Tensor,
        attention_mask: &Tensor,
        token_type_ids: Option<&Tensor>,
    ) -> Result<Vec<Tensor>> {
        let input_ids = input_ids.to_device(self.device);
        let attention_mask = attention_mask.to_device(self.device);
        let token_type_ids = token_type_ids.map(|t| t.to_device(self.device));

        let hidden_states = no_grad(|| -> Result<Option<Vec<Tensor>>> {
            Ok(match &self.encoder {
                EncoderModel::Bert(model) => {
                    model
                        .forward_t(
                            Some(&input_ids),
                            Some(&attention_mask),
                            token_type_ids.as_ref(),
                            None,
                            None,
                            None,
                            None,
                            false,
                        )?
                        .all_hidden_states
                }
                EncoderModel::DistilBert(model) => {
                    model
                        .forward_t(Some(&input_ids), Some(&attention_mask), None, false)?
                        .all_hidden_states
                }
                EncoderModel::Roberta(model) => {
                    model
                        .forward_t(
                            Some(&input_ids),
                            Some(&attention_mask),
                            None,
                            None,
                            None,
                            None,
                            None,
                            false,
                        )
                        .all_hidden_states
                }
            })
        })?;

        hidden_states.ok_or_else(|| anyhow!("Encoder returned no hidden states"))
    }
}

/// Resolves a possibly negative layer index against `num_layers`.
pub fn layer_index(layer: Option<i32>, num_layers: usize) -> Result<usize> {
    match layer {
        Some(n) if n >= 0 => {
            let idx = n as usize;
            if idx >= num_layers {
                Err(anyhow!(
                    "Requested layer {} but model only has {} layers",
                    idx,
                    num_layers
                ))
            } else {
                Ok(idx)
            }
        }
        Some(n) => {
            let idx = num_layers as i32 + n;
            if idx < 0 {
                Err(anyhow!("Invalid layer index {}", n))
            } else {
                Ok(idx as usize)
            }
        }
        None => num_layers
            .checked_sub(1)
            .ok_or_else(|| anyhow!("Model produced no layers")),
    }
}
