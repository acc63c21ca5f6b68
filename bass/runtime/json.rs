//! The JSON codec for values.
//!
//! Scopes become objects and lists become arrays. Paths, thunks and secrets
//! become single-key objects tagged with their kind. Decoding recognizes the
//! tags before falling back to a plain scope.

use std::{
   collections::BTreeMap,
   sync::Arc,
};

use bytes::Bytes;
use serde_json::{
   Map,
   Value as Json,
   json,
};

use crate::{
   CachePath,
   CommandPath,
   DirPath,
   Error,
   FileOrDir,
   FilePath,
   FsPath,
   HostPath,
   Result,
   Scope,
   Secret,
   Symbol,
   Thunk,
   ThunkAddr,
   ThunkPath,
   Value,
};

fn path_json(path: &FileOrDir) -> Json {
   match *path {
      FileOrDir::File(ref file) => json!({ "file": file.path() }),
      FileOrDir::Dir(ref dir) => json!({ "dir": dir.path() }),
   }
}

impl Value {
   /// Encodes the value as JSON. Combiners, pipes, errors and unevaluated
   /// forms cannot be encoded.
   pub fn to_json(&self) -> Result<Json> {
      Ok(match *self.unannotated() {
         Value::Null => Json::Null,
         Value::Bool(boolean) => Json::Bool(boolean),
         Value::Int(int) => Json::from(int),
         Value::String(ref string) => Json::String(string.to_string()),
         Value::Symbol(ref symbol) => json!({ "symbol": symbol.as_str() }),

         Value::Empty | Value::Pair(_) => {
            let values = self.to_vec().ok_or_else(|| {
               Error::Encode {
                  value: self.clone(),
               }
            })?;

            Json::Array(values.iter().map(Value::to_json).collect::<Result<_>>()?)
         },

         Value::Scope(ref scope) => {
            let mut object = Map::new();
            for (symbol, value) in scope.bindings() {
               object.insert(symbol.json_key(), value.to_json()?);
            }
            Json::Object(object)
         },

         Value::File(ref file) => json!({ "file": file.path() }),
         Value::Dir(ref dir) => json!({ "dir": dir.path() }),
         Value::Command(ref command) => json!({ "command": command.name() }),

         Value::HostPath(ref host) => {
            json!({ "host": { "context": &*host.context_dir, "path": path_json(&host.path) } })
         },

         Value::CachePath(ref cache) => {
            json!({ "cache": { "id": &*cache.id, "path": path_json(&cache.path) } })
         },

         Value::FsPath(ref fs) => {
            let files = fs
               .files
               .iter()
               .map(|(name, data)| {
                  (
                     name.clone(),
                     Json::String(String::from_utf8_lossy(data).into_owned()),
                  )
               })
               .collect::<Map<_, _>>();

            json!({ "fs": { "id": &*fs.id, "files": files, "path": path_json(&fs.path) } })
         },

         Value::Secret(ref secret) => json!({ "secret": secret.name() }),

         Value::Thunk(ref thunk) => json!({ "thunk": thunk.to_json()? }),

         Value::ThunkPath(ref path) => {
            json!({ "thunk_path": { "thunk": path.thunk.to_json()?, "path": path_json(&path.path) } })
         },

         Value::ThunkAddr(ref addr) => {
            json!({
               "thunk_addr": {
                  "thunk": addr.thunk.to_json()?,
                  "port": &addr.port,
                  "format": &addr.format,
               }
            })
         },

         _ => {
            return Err(Error::Encode {
               value: self.clone(),
            });
         },
      })
   }

   /// Decodes a JSON value. Tagged objects become the value they tag;
   /// everything else maps structurally.
   pub fn from_json(json: &Json) -> Result<Self> {
      Ok(match *json {
         Json::Null => Value::Null,
         Json::Bool(boolean) => Value::Bool(boolean),

         Json::Number(ref number) => {
            Value::Int(number.as_i64().ok_or_else(|| {
               Error::Host(bass_error::error!("number out of range: {number}"))
            })?)
         },

         Json::String(ref string) => Value::string(string.as_str()),

         Json::Array(ref values) => {
            Value::list(values.iter().map(Value::from_json).collect::<Result<Vec<_>>>()?)
         },

         Json::Object(ref object) => {
            if let Some(value) = from_tagged(object)? {
               return Ok(value);
            }

            let scope = Scope::new();
            for (key, value) in object {
               scope.set(Symbol::from_json_key(key), Value::from_json(value)?);
            }
            Value::Scope(scope)
         },
      })
   }
}

fn from_tagged(object: &Map<String, Json>) -> Result<Option<Value>> {
   let mut entries = object.iter();

   let (Some((tag, inner)), None) = (entries.next(), entries.next()) else {
      return Ok(None);
   };

   Ok(Some(match (tag.as_str(), inner) {
      ("symbol", &Json::String(ref name)) => Value::symbol(name),
      ("file", &Json::String(ref path)) => Value::File(FilePath::new(path)),
      ("dir", &Json::String(ref path)) => Value::Dir(DirPath::new(path)),
      ("command", &Json::String(ref name)) => Value::Command(CommandPath::new(name)),
      ("secret", &Json::String(ref name)) => Value::Secret(Secret::redacted(name)),

      ("host", &Json::Object(ref fields)) => {
         let (Some(context), Some(path)) = (str_field(fields, "context"), path_field(fields)?) else {
            return Ok(None);
         };

         Value::HostPath(Arc::new(HostPath::new(context, path)))
      },

      ("cache", &Json::Object(ref fields)) => {
         let (Some(id), Some(path)) = (str_field(fields, "id"), path_field(fields)?) else {
            return Ok(None);
         };

         Value::CachePath(Arc::new(CachePath::new(id, path)))
      },

      ("fs", &Json::Object(ref fields)) => {
         let (Some(Json::Object(files)), Some(path)) = (fields.get("files"), path_field(fields)?)
         else {
            return Ok(None);
         };

         let files = files
            .iter()
            .filter_map(|(name, content)| {
               content
                  .as_str()
                  .map(|content| (name.clone(), Bytes::from(content.to_owned())))
            })
            .collect::<BTreeMap<_, _>>();

         Value::FsPath(Arc::new(FsPath::new(files).with_path(path)))
      },

      ("thunk", &Json::Object(_)) => {
         let Some(thunk) = thunk_field(inner)? else {
            return Ok(None);
         };

         Value::Thunk(thunk)
      },

      ("thunk_path", &Json::Object(ref fields)) => {
         let (Some(thunk), Some(path)) = (
            fields.get("thunk").map(thunk_field).transpose()?.flatten(),
            path_field(fields)?,
         ) else {
            return Ok(None);
         };

         Value::ThunkPath(Arc::new(ThunkPath { thunk, path }))
      },

      ("thunk_addr", &Json::Object(ref fields)) => {
         let (Some(thunk), Some(port), Some(format)) = (
            fields.get("thunk").map(thunk_field).transpose()?.flatten(),
            str_field(fields, "port"),
            str_field(fields, "format"),
         ) else {
            return Ok(None);
         };

         Value::ThunkAddr(Arc::new(ThunkAddr {
            thunk,
            port: port.to_owned(),
            format: format.to_owned(),
         }))
      },

      _ => return Ok(None),
   }))
}

fn str_field<'a>(fields: &'a Map<String, Json>, key: &str) -> Option<&'a str> {
   fields.get(key).and_then(Json::as_str)
}

fn path_field(fields: &Map<String, Json>) -> Result<Option<FileOrDir>> {
   let Some(path) = fields.get("path") else {
      return Ok(None);
   };

   Ok(match Value::from_json(path)? {
      Value::File(file) => Some(FileOrDir::File(file)),
      Value::Dir(dir) => Some(FileOrDir::Dir(dir)),
      _ => None,
   })
}

/// Decodes the body of a thunk. Bodies that do not describe a thunk are not
/// an error; the enclosing object decodes as a scope instead.
fn thunk_field(json: &Json) -> Result<Option<Arc<Thunk>>> {
   let value = Value::from_json(json)?;

   if !matches!(value, Value::Scope(_)) {
      return Ok(None);
   }

   Ok(Thunk::from_fields(&value).ok().map(Arc::new))
}
