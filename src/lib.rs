pub mod core;
pub mod datastore;
pub mod dictionary;
pub mod enumstore;
pub mod attribute;
pub mod rank;
pub mod features;
pub mod feed;

/*
┌────────────────────────────────────────────────────────────────────────────────────────────┐
│                            SEARCHCORE STRUCT ARCHITECTURE                                   │
└────────────────────────────────────────────────────────────────────────────────────────────┘

┌─────────────────────────────────────── CORE LAYER ──────────────────────────────────────────┐
│                                                                                              │
│  ┌──────────────────────┐  ┌──────────────────────┐  ┌─────────────────────────────────┐   │
│  │ struct Config        │  │ struct Document      │  │ struct GenerationHandler        │   │
│  │ • attributes         │  │ • id: DocId          │  │ • current: AtomicU64            │   │
│  │ • rank: RankConfig   │  │ • fields: HashMap<   │  │ • oldest_used: AtomicU64        │   │
│  └──────────────────────┘  │   String,FieldValue> │  │ • readers per generation        │   │
│                            └──────────────────────┘  └─────────────────────────────────┘   │
│  ┌──────────────────────┐  ┌──────────────────────┐  ┌─────────────────────────────────┐   │
│  │ struct Error         │  │ struct MemoryUsage   │  │ struct GenerationGuard          │   │
│  │ • kind: ErrorKind    │  │ • allocated / used   │  │ • pins one generation           │   │
│  │ • context: String    │  │ • dead / on_hold     │  └─────────────────────────────────┘   │
│  └──────────────────────┘  └──────────────────────┘                                        │
└──────────────────────────────────────────────────────────────────────────────────────────────┘

┌──────────────────────────────────── STORAGE LAYER ──────────────────────────────────────────┐
│                                                                                              │
│  ┌────────────────────────────────────────────────────────────────────────────────────┐    │
│  │                           struct DataStore<T>                                       │    │
│  │  ┌──────────────────────────────────────────────────────────────────────────────┐ │    │
│  │  │ buffers: Vec<AtomicArc<Buffer>>   // 1023 usable buffers, lock-free reads    │ │    │
│  │  │ hold_list: HoldList               // retired memory tagged by generation     │ │    │
│  │  │ compacting: RoaringBitmap         // buffers being moved out of              │ │    │
│  │  └──────────────────────────────────────────────────────────────────────────────┘ │    │
│  └────────────────────────────────────────────────────────────────────────────────────┘    │
│                                                                                              │
│  ┌───────────────────┐  ┌─────────────────────────┐  ┌──────────────────────────────┐     │
│  │ struct EntryRef   │  │ trait EnumStoreDictionary│  │ struct EnumStore<T>          │     │
│  │ • 10 bit buffer   │  │ • BTreeDictionary        │  │ • store: DataStore<Entry>    │     │
│  │ • 22 bit offset   │  │ • HashDictionary         │  │ • dictionary: Box<dyn ..>    │     │
│  └───────────────────┘  │ • HybridDictionary       │  │ • ref counts, batch updater  │     │
│                         └─────────────────────────┘  └──────────────────────────────┘     │
└──────────────────────────────────────────────────────────────────────────────────────────────┘

┌─────────────────────────────────── ATTRIBUTE LAYER ─────────────────────────────────────────┐
│                                                                                              │
│  ┌────────────────────────┐  ┌─────────────────────────┐  ┌──────────────────────────┐     │
│  │ struct EnumAttribute<T>│  │ trait AttributeVector    │  │ struct PostingStore      │     │
│  │ • enum_store           │  │ • update_field / commit  │  │ • bitmap or weighted     │     │
│  │ • single / multi values│  │ • save / load            │  │   posting per value      │     │
│  │ • pending changes      │  │ • make_reader            │  └──────────────────────────┘     │
│  └────────────────────────┘  └─────────────────────────┘                                    │
└──────────────────────────────────────────────────────────────────────────────────────────────┘

┌────────────────────────────────────── RANK LAYER ───────────────────────────────────────────┐
│                                                                                              │
│  ┌──────────────────────┐  ┌────────────────────────┐  ┌──────────────────────────────┐    │
│  │ struct FeatureName   │  │ struct BlueprintResolver│  │ struct RankProgram           │    │
│  │ • base_name          │  │ • seeds                 │  │ • slots (topological)        │    │
│  │ • parameters         │  │ • executor specs        │  │ • lazy, memoized per doc     │    │
│  │ • output             │  │ • feature map, warnings │  │ • constants folded at setup  │    │
│  └──────────────────────┘  └────────────────────────┘  └──────────────────────────────┘    │
└──────────────────────────────────────────────────────────────────────────────────────────────┘

┌────────────────────────────────── RELATIONSHIPS ────────────────────────────────────────────┐
│                                                                                              │
│  Feeder ──retains──> PendingTracker                                                         │
│     │                                                                                       │
│     └──calls──> PersistenceProvider ──applies──> AttributeWriter ──updates──> AttributeVector│
│                                                                                              │
│  EnumAttribute ──owns──> EnumStore ──owns──> DataStore + EnumStoreDictionary                │
│        │                                                                                    │
│        └──commit──> GenerationHandler ──frees──> HoldList                                   │
│                                                                                              │
│  BlueprintResolver ──creates──> Blueprint (BlueprintFactory) ──declares──> inputs/outputs   │
│        │                                                                                    │
│        └──compiled_into──> RankProgram ──runs──> FeatureExecutor ──reads──> AttributeReader │
│                                                                                              │
└──────────────────────────────────────────────────────────────────────────────────────────────┘
*/
